//! Alias-based routing of generation requests.
//!
//! An [`AudioRouter`] binds caller-chosen aliases to loaded drivers built
//! through a [`ModelRegistry`], and can put an [`AudioCache`] in front of
//! them.
//!
//! # Caching
//!
//! Caching is opt-in at construction ([`AudioRouter::with_cache`]) and can be
//! skipped per request with a `"cache": false` parameter. Results are keyed by
//! alias, text and the remaining parameters. Chunked generations are cached
//! once the caller has pulled the whole stream without an error; a stream
//! dropped early leaves the cache untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::cache::{AudioCache, CacheConfig};
use crate::config::Params;
use crate::driver::{AudioAccumulator, AudioChunk, ChunkStream, Generation, SynthesisDriver};
use crate::error::{Result, VocoError};
use crate::registry::ModelRegistry;

/// Per-request parameter that turns caching off when `false`.
pub const CACHE_PARAM: &str = "cache";

struct Binding {
    model: String,
    driver: Box<dyn SynthesisDriver>,
}

/// Snapshot of one alias binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModel {
    /// Registry name the driver was built from.
    pub model: String,
    pub device: String,
    pub dtype: String,
    pub loaded: bool,
}

/// A driver whose `unload()` failed during [`AudioRouter::unload_all`].
#[derive(Debug)]
pub struct UnloadFailure {
    pub alias: String,
    pub error: VocoError,
}

/// Routes requests to drivers by alias.
///
/// Not synchronized: share it between threads behind a mutex.
pub struct AudioRouter {
    registry: Arc<ModelRegistry>,
    models: BTreeMap<String, Binding>,
    cache: Option<Arc<AudioCache>>,
}

impl AudioRouter {
    /// A router without a result cache.
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            models: BTreeMap::new(),
            cache: None,
        }
    }

    /// A router whose `infer` results go through an [`AudioCache`].
    ///
    /// # Errors
    /// [`VocoError::InvalidCacheConfig`] for an out-of-range TTL, or an I/O
    /// error if the cache directory cannot be created.
    pub fn with_cache(registry: Arc<ModelRegistry>, config: CacheConfig) -> Result<Self> {
        let cache = AudioCache::new(config)?;
        Ok(Self {
            registry,
            models: BTreeMap::new(),
            cache: Some(Arc::new(cache)),
        })
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> Option<&AudioCache> {
        self.cache.as_deref()
    }

    /// Build and load a `name` driver and bind it to `alias` (default: `name`).
    ///
    /// # Errors
    /// - [`VocoError::AliasConflict`] if `alias` is already bound.
    /// - [`VocoError::InvalidModelName`] if a cache is configured and `alias`
    ///   cannot be used as a cache directory name.
    /// - Anything [`ModelRegistry::instantiate`] returns, including the
    ///   driver's own `load()` failure. No binding is created in that case.
    pub fn load(
        &mut self,
        name: &str,
        alias: Option<&str>,
        device: Option<&str>,
        dtype: Option<&str>,
        options: Params,
    ) -> Result<&dyn SynthesisDriver> {
        let alias = alias.unwrap_or(name);
        if self.models.contains_key(alias) {
            return Err(VocoError::AliasConflict(alias.to_string()));
        }
        if let Some(cache) = &self.cache {
            cache.validate_model(alias)?;
        }

        let driver = self.registry.instantiate(name, device, dtype, true, options)?;
        log::info!("Bound '{}' to alias '{}'", name, alias);

        let binding = self.models.entry(alias.to_string()).or_insert(Binding {
            model: name.to_string(),
            driver,
        });
        Ok(binding.driver.as_ref())
    }

    /// Generate speech with the driver bound to `alias`.
    ///
    /// With a cache configured, caching not disabled by `"cache": false`, and
    /// non-empty `text`, a cached result is returned as
    /// [`Generation::Audio`] without calling the driver. Otherwise the
    /// driver's result is returned unmodified, and stored on the way out when
    /// caching applies.
    ///
    /// # Errors
    /// - [`VocoError::AliasNotBound`] listing the bound aliases.
    /// - [`VocoError::NotLoaded`] if the bound driver was unloaded directly.
    /// - Whatever the driver's `generate()` returns.
    pub fn infer(&mut self, alias: &str, text: &str, params: Params) -> Result<Generation> {
        let mut params = params;
        let use_cache = take_cache_flag(&mut params);

        let binding = match self.models.get_mut(alias) {
            Some(binding) => binding,
            None => return Err(alias_not_bound(&self.models, alias)),
        };

        let cache = match &self.cache {
            Some(cache) if use_cache && !text.is_empty() => Some(Arc::clone(cache)),
            _ => None,
        };

        if let Some(cache) = &cache {
            if let Some(bytes) = cache.get(alias, text, &params)? {
                log::debug!("Serving '{}' from cache", alias);
                return Ok(Generation::Audio(bytes));
            }
        }

        binding.driver.ensure_loaded()?;
        let generation = binding.driver.generate(text, &params)?;

        let Some(cache) = cache else {
            return Ok(generation);
        };

        match generation {
            Generation::Audio(bytes) => {
                if let Err(e) = cache.put(alias, text, &bytes, &params) {
                    log::warn!("Failed to cache result for '{}': {}", alias, e);
                }
                Ok(Generation::Audio(bytes))
            }
            Generation::Chunks(stream) => Ok(Generation::Chunks(Box::new(CachingStream::new(
                stream,
                cache,
                alias.to_string(),
                text.to_string(),
                params,
            )))),
        }
    }

    pub fn get_model(&self, alias: &str) -> Result<&dyn SynthesisDriver> {
        match self.models.get(alias) {
            Some(binding) => Ok(binding.driver.as_ref()),
            None => Err(alias_not_bound(&self.models, alias)),
        }
    }

    pub fn get_model_mut(&mut self, alias: &str) -> Result<&mut dyn SynthesisDriver> {
        if !self.models.contains_key(alias) {
            return Err(alias_not_bound(&self.models, alias));
        }
        match self.models.get_mut(alias) {
            Some(binding) => Ok(binding.driver.as_mut()),
            None => Err(VocoError::NotLoaded),
        }
    }

    /// Unload the driver bound to `alias` and drop the binding.
    ///
    /// If the driver's `unload()` fails the error is returned and the binding
    /// is kept, so the call can be retried.
    pub fn unload(&mut self, alias: &str) -> Result<()> {
        let binding = match self.models.get_mut(alias) {
            Some(binding) => binding,
            None => return Err(alias_not_bound(&self.models, alias)),
        };
        binding.driver.unload()?;
        self.models.remove(alias);
        log::info!("Unloaded alias '{}'", alias);
        Ok(())
    }

    /// Unload every driver and clear all bindings.
    ///
    /// Never stops early: each failing `unload()` is logged and reported in
    /// the returned list, and the binding set is empty afterwards regardless.
    pub fn unload_all(&mut self) -> Vec<UnloadFailure> {
        let mut failures = Vec::new();
        for (alias, mut binding) in std::mem::take(&mut self.models) {
            match binding.driver.unload() {
                Ok(()) => log::info!("Unloaded alias '{}'", alias),
                Err(error) => {
                    log::warn!("Failed to unload alias '{}': {}", alias, error);
                    failures.push(UnloadFailure { alias, error });
                }
            }
        }
        failures
    }

    pub fn list_loaded(&self) -> BTreeMap<String, LoadedModel> {
        self.models
            .iter()
            .map(|(alias, binding)| {
                (
                    alias.clone(),
                    LoadedModel {
                        model: binding.model.clone(),
                        device: binding.driver.device().to_string(),
                        dtype: binding.driver.dtype().to_string(),
                        loaded: binding.driver.is_loaded(),
                    },
                )
            })
            .collect()
    }

    /// Whether `alias` is bound.
    pub fn is_loaded(&self, alias: &str) -> bool {
        self.models.contains_key(alias)
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.models.contains_key(alias)
    }

    pub fn aliases(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Drop for AudioRouter {
    fn drop(&mut self) {
        self.unload_all();
    }
}

fn alias_not_bound(models: &BTreeMap<String, Binding>, alias: &str) -> VocoError {
    VocoError::AliasNotBound {
        alias: alias.to_string(),
        available: models.keys().cloned().collect(),
    }
}

/// Remove the `cache` flag from `params`. Absent or `null` means enabled.
fn take_cache_flag(params: &mut Params) -> bool {
    match params.remove(CACHE_PARAM) {
        None | Some(Value::Null) => true,
        Some(Value::Bool(enabled)) => enabled,
        Some(other) => {
            log::warn!("Ignoring non-boolean '{}' parameter: {}", CACHE_PARAM, other);
            true
        }
    }
}

/// Passes chunks through while collecting their audio; stores the assembled
/// WAV once the inner stream is exhausted without errors.
struct CachingStream {
    inner: ChunkStream,
    cache: Arc<AudioCache>,
    model: String,
    text: String,
    params: Params,
    audio: AudioAccumulator,
    failed: bool,
    finished: bool,
}

impl CachingStream {
    fn new(
        inner: ChunkStream,
        cache: Arc<AudioCache>,
        model: String,
        text: String,
        params: Params,
    ) -> Self {
        Self {
            inner,
            cache,
            model,
            text,
            params,
            audio: AudioAccumulator::default(),
            failed: false,
            finished: false,
        }
    }

    fn store(&mut self) -> Result<()> {
        let Some(audio) = std::mem::take(&mut self.audio).finish() else {
            log::debug!("Stream for '{}' carried no audio, not caching", self.model);
            return Ok(());
        };
        let bytes = audio.to_wav_bytes()?;
        self.cache.put(&self.model, &self.text, &bytes, &self.params)
    }
}

impl Iterator for CachingStream {
    type Item = Result<AudioChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.inner.next() {
            Some(Ok(chunk)) => {
                if !self.failed {
                    if let Err(e) = self.audio.push(&chunk) {
                        log::warn!("Not caching stream for '{}': {}", self.model, e);
                        self.failed = true;
                    }
                }
                Some(Ok(chunk))
            }
            Some(Err(e)) => {
                self.failed = true;
                Some(Err(e))
            }
            None => {
                self.finished = true;
                if !self.failed {
                    if let Err(e) = self.store() {
                        log::warn!("Failed to cache result for '{}': {}", self.model, e);
                    }
                }
                None
            }
        }
    }
}
