//! Model-type registry.
//!
//! Maps a model-type name (e.g. `"kokoro"`) to a constructor producing a
//! [`SynthesisDriver`]. The router only ever talks to drivers through this
//! table, so it never needs to know a driver's concrete type.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::config::{DriverConfig, Params};
use crate::device::{resolve_device, resolve_dtype};
use crate::driver::SynthesisDriver;
use crate::error::{Result, VocoError};

/// Builds an unloaded driver from its normalised configuration.
pub type DriverConstructor =
    Arc<dyn Fn(DriverConfig) -> Result<Box<dyn SynthesisDriver>> + Send + Sync>;

/// Table of registered driver constructors.
///
/// The table is guarded by a lock so one registry can be shared (via `Arc`)
/// between routers and threads.
#[derive(Default)]
pub struct ModelRegistry {
    constructors: RwLock<BTreeMap<String, DriverConstructor>>,
}

static GLOBAL: OnceLock<Arc<ModelRegistry>> = OnceLock::new();

/// The process-wide registry, created empty on first use.
///
/// It is never reset implicitly; tests sharing it must call
/// [`ModelRegistry::clear_all`].
pub fn global() -> Arc<ModelRegistry> {
    GLOBAL.get_or_init(|| Arc::new(ModelRegistry::new())).clone()
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver constructor under `name`.
    ///
    /// # Errors
    /// - [`VocoError::AlreadyRegistered`] if `name` is taken; the existing
    ///   entry is left untouched.
    /// - [`VocoError::InvalidDriver`] if `name` is empty.
    pub fn register<F>(&self, name: &str, constructor: F) -> Result<()>
    where
        F: Fn(DriverConfig) -> Result<Box<dyn SynthesisDriver>> + Send + Sync + 'static,
    {
        self.register_constructor(name, Arc::new(constructor))
    }

    pub fn register_constructor(&self, name: &str, constructor: DriverConstructor) -> Result<()> {
        if name.trim().is_empty() {
            return Err(VocoError::InvalidDriver {
                name: name.to_string(),
                reason: "model type name must not be empty".to_string(),
            });
        }

        let mut table = self.constructors.write();
        if table.contains_key(name) {
            return Err(VocoError::AlreadyRegistered(name.to_string()));
        }
        table.insert(name.to_string(), constructor);
        log::info!("Registered model type '{}'", name);
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> Result<()> {
        let removed = self.constructors.write().remove(name);
        match removed {
            Some(_) => {
                log::info!("Unregistered model type '{}'", name);
                Ok(())
            }
            None => Err(self.not_found(name)),
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.constructors.read().contains_key(name)
    }

    /// Snapshot of the table. Later registry changes do not affect it.
    pub fn list_registered(&self) -> BTreeMap<String, DriverConstructor> {
        self.constructors.read().clone()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.constructors.read().keys().cloned().collect()
    }

    /// Construct a driver for `name`.
    ///
    /// Missing or empty `device`/`dtype` resolve to `"cpu"`/`"float32"`;
    /// `options` are passed through untouched. With `auto_load` the driver's
    /// `load()` is called before returning and any failure is returned as-is.
    ///
    /// # Errors
    /// - [`VocoError::NotFound`] listing the registered names if `name` is unknown.
    /// - [`VocoError::InvalidDriver`] if the constructor returns an already
    ///   loaded driver.
    pub fn instantiate(
        &self,
        name: &str,
        device: Option<&str>,
        dtype: Option<&str>,
        auto_load: bool,
        options: Params,
    ) -> Result<Box<dyn SynthesisDriver>> {
        // Clone out so the lock is not held while the driver is built.
        let constructor = self.constructors.read().get(name).cloned();
        let constructor = constructor.ok_or_else(|| self.not_found(name))?;

        let config = DriverConfig::new(resolve_device(device), resolve_dtype(dtype), options);
        log::debug!(
            "Constructing '{}' on device={} dtype={}",
            name,
            config.device,
            config.dtype
        );
        let mut driver = constructor(config)?;

        if driver.is_loaded() {
            return Err(VocoError::InvalidDriver {
                name: name.to_string(),
                reason: "constructor returned a driver that is already loaded".to_string(),
            });
        }

        if auto_load {
            driver.load()?;
            log::info!("Loaded model '{}' on {}", name, driver.device());
        }

        Ok(driver)
    }

    /// Remove every registration.
    ///
    /// Meant for test isolation. Drivers constructed earlier stay usable but
    /// can no longer be looked up by name.
    pub fn clear_all(&self) {
        self.constructors.write().clear();
    }

    fn not_found(&self, name: &str) -> VocoError {
        VocoError::NotFound {
            name: name.to_string(),
            available: self.names(),
        }
    }
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("models", &self.names())
            .finish()
    }
}
