use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Serialize;

use super::config::CacheConfig;
use super::key::cache_key;
use crate::config::Params;
use crate::error::{Result, VocoError};

/// File extension of every cache entry.
pub const ENTRY_EXTENSION: &str = "wav";

/// Eviction shrinks the cache to this percentage of `max_size_bytes`.
const EVICTION_TARGET_PERCENT: u64 = 70;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Usage report produced by [`AudioCache::stats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_size_bytes: u64,
    pub max_size_bytes: u64,
    /// Percentage of `max_size_bytes` in use, one decimal. 0 when the limit is 0.
    pub usage_percent: f64,
    pub total_entries: usize,
    pub ttl_hours: f64,
    /// Per model directory; models without entries are omitted.
    pub models: BTreeMap<String, ModelStats>,
}

impl CacheStats {
    pub fn total_size_mb(&self) -> f64 {
        self.total_size_bytes as f64 / BYTES_PER_MB
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelStats {
    pub size_bytes: u64,
    pub entries: usize,
}

/// One `.wav` file found on disk.
#[derive(Debug, Clone)]
struct Entry {
    model: String,
    path: PathBuf,
    size: u64,
    modified: SystemTime,
}

/// Disk-backed store of generated audio.
///
/// Entries live at `<cache_dir>/<model>/<sha256-hex>.wav`. The directory tree
/// is the only index: an entry's size and modification time come from the
/// filesystem, and the modification time drives both TTL expiry and eviction
/// order. Reads never refresh it, so eviction removes the oldest writes first.
///
/// Expired entries are only removed when looked up. Contents are trusted as
/// found; nothing is checksummed on read.
#[derive(Debug, Clone)]
pub struct AudioCache {
    cache_dir: PathBuf,
    max_size_bytes: u64,
    warn_threshold_bytes: u64,
    ttl: Duration,
}

impl AudioCache {
    /// Validate `config` and create the cache directory.
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let cache_dir = config.resolved_cache_dir();
        fs::create_dir_all(&cache_dir)?;
        log::info!("Audio cache initialized at {}", cache_dir.display());

        Ok(Self {
            cache_dir,
            max_size_bytes: config.max_size_bytes(),
            warn_threshold_bytes: config.warn_threshold_bytes(),
            ttl: config.ttl(),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// See [`cache_key`].
    pub fn key(&self, model: &str, text: &str, params: &Params) -> String {
        cache_key(model, text, params)
    }

    /// `<cache_dir>/<model>/<key>.wav`.
    ///
    /// # Errors
    /// [`VocoError::InvalidModelName`] unless `model` is a single plain path
    /// component.
    pub fn path(&self, model: &str, key: &str) -> Result<PathBuf> {
        Ok(self
            .model_dir(model)?
            .join(format!("{key}.{ENTRY_EXTENSION}")))
    }

    /// Look up a cached result. Expired entries are deleted and reported as a miss.
    pub fn get(&self, model: &str, text: &str, params: &Params) -> Result<Option<Vec<u8>>> {
        let key = self.key(model, text, params);
        let path = self.path(model, &key)?;

        let metadata = match fs::metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let age = SystemTime::now()
            .duration_since(metadata.modified()?)
            .unwrap_or_default();
        if age > self.ttl {
            log::debug!("Cache entry {} expired ({}s old)", key, age.as_secs());
            remove_file_if_exists(&path)?;
            return Ok(None);
        }

        match fs::read(&path) {
            Ok(bytes) => {
                log::debug!("Cache hit for {}/{}", model, key);
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Store `audio`, replacing any entry with the same key.
    ///
    /// Size limits are checked against the entries already on disk before the
    /// write: at or above `max_size_bytes` the oldest entries are evicted down
    /// to 70% of the limit, at or above the warning threshold a warning is
    /// logged. The blob goes to a temporary file first and is renamed into
    /// place.
    pub fn put(&self, model: &str, text: &str, audio: &[u8], params: &Params) -> Result<()> {
        let key = self.key(model, text, params);
        let path = self.path(model, &key)?;

        self.check_and_warn()?;

        let dir = self.model_dir(model)?;
        fs::create_dir_all(&dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(audio)?;
        tmp.persist(&path).map_err(|e| e.error)?;

        log::debug!("Cached {} bytes at {}", audio.len(), path.display());
        Ok(())
    }

    /// Total bytes of all entries across every model.
    pub fn total_size(&self) -> Result<u64> {
        Ok(self.entries()?.iter().map(|e| e.size).sum())
    }

    /// Delete entries, oldest modification time first, until the total size is
    /// at most `target_size` or nothing is left. Returns the number deleted.
    pub fn purge_oldest(&self, target_size: u64) -> Result<usize> {
        let mut entries = self.entries()?;
        entries.sort_by_key(|e| e.modified);

        let mut current: u64 = entries.iter().map(|e| e.size).sum();
        let mut removed = 0;
        for entry in &entries {
            if current <= target_size {
                break;
            }
            remove_file_if_exists(&entry.path)?;
            current = current.saturating_sub(entry.size);
            removed += 1;
        }

        log::info!(
            "Purged {} cache entries, {:.1}MB remaining",
            removed,
            current as f64 / BYTES_PER_MB
        );
        Ok(removed)
    }

    /// Delete the entries of one model, or of every model when `model` is `None`.
    pub fn clear(&self, model: Option<&str>) -> Result<()> {
        match model {
            Some(model) => {
                let dir = self.model_dir(model)?;
                if !dir.is_dir() {
                    return Ok(());
                }
                for path in wav_files(&dir)? {
                    remove_file_if_exists(&path)?;
                }
                fs::remove_dir(&dir)?;
                log::info!("Cleared cache for '{}'", model);
            }
            None => {
                for dir in self.model_dirs()? {
                    for path in wav_files(&dir)? {
                        remove_file_if_exists(&path)?;
                    }
                    // In-flight writes may still hold a temp file here.
                    if let Err(e) = fs::remove_dir(&dir) {
                        log::debug!("Kept cache dir {}: {}", dir.display(), e);
                    }
                }
                log::info!("Cleared cache at {}", self.cache_dir.display());
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats {
            max_size_bytes: self.max_size_bytes,
            ttl_hours: round_to(self.ttl.as_secs() as f64 / 3600.0, 1),
            ..Default::default()
        };

        for entry in self.entries()? {
            stats.total_size_bytes += entry.size;
            stats.total_entries += 1;
            let model = stats.models.entry(entry.model).or_default();
            model.size_bytes += entry.size;
            model.entries += 1;
        }

        if self.max_size_bytes > 0 {
            stats.usage_percent = round_to(
                stats.total_size_bytes as f64 * 100.0 / self.max_size_bytes as f64,
                1,
            );
        }
        Ok(stats)
    }

    fn check_and_warn(&self) -> Result<()> {
        let total = self.total_size()?;
        if total >= self.max_size_bytes {
            log::warn!(
                "Cache full ({:.1}MB). Auto-purging oldest entries...",
                total as f64 / BYTES_PER_MB
            );
            let target = u128::from(self.max_size_bytes) * u128::from(EVICTION_TARGET_PERCENT) / 100;
            self.purge_oldest(target as u64)?;
        } else if total >= self.warn_threshold_bytes {
            log::warn!(
                "Cache at {:.1}MB / {:.0}MB. Run clear() to free space.",
                total as f64 / BYTES_PER_MB,
                self.max_size_bytes as f64 / BYTES_PER_MB
            );
        }
        Ok(())
    }

    /// Check that `model` is a single plain path component.
    pub fn validate_model(&self, model: &str) -> Result<()> {
        let mut components = Path::new(model).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) if name == model => Ok(()),
            _ => Err(VocoError::InvalidModelName(model.to_string())),
        }
    }

    fn model_dir(&self, model: &str) -> Result<PathBuf> {
        self.validate_model(model)?;
        Ok(self.cache_dir.join(model))
    }

    fn model_dirs(&self) -> Result<Vec<PathBuf>> {
        let read = match fs::read_dir(&self.cache_dir) {
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut dirs = Vec::new();
        for entry in read {
            let path = entry?.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        Ok(dirs)
    }

    fn entries(&self) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        for dir in self.model_dirs()? {
            let model = match dir.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            for path in wav_files(&dir)? {
                // Files can vanish between listing and stat under concurrent eviction.
                let metadata = match fs::metadata(&path) {
                    Ok(m) => m,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(e.into()),
                };
                entries.push(Entry {
                    model: model.clone(),
                    path,
                    size: metadata.len(),
                    modified: metadata.modified()?,
                });
            }
        }
        Ok(entries)
    }
}

fn wav_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let read = match fs::read_dir(dir) {
        Ok(read) => read,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    for entry in read {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION) {
            files.push(path);
        }
    }
    Ok(files)
}

fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs::File;
    use tempfile::TempDir;

    const MB: usize = 1024 * 1024;

    fn cache_in(dir: &TempDir, max_size_mb: u64) -> AudioCache {
        AudioCache::new(CacheConfig {
            cache_dir: dir.path().to_path_buf(),
            max_size_mb,
            ttl_seconds: 3600,
            warn_at_percent: 80,
        })
        .unwrap()
    }

    fn params(value: serde_json::Value) -> Params {
        value.as_object().cloned().unwrap_or_default()
    }

    fn set_age(path: &Path, age: Duration) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn rejects_ttl_out_of_range() {
        let dir = TempDir::new().unwrap();
        let result = AudioCache::new(CacheConfig {
            cache_dir: dir.path().to_path_buf(),
            ttl_seconds: 60,
            ..Default::default()
        });
        assert!(matches!(result, Err(VocoError::InvalidCacheConfig(_))));
    }

    #[test]
    fn creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let cache = AudioCache::new(CacheConfig {
            cache_dir: nested.clone(),
            ..Default::default()
        })
        .unwrap();
        assert!(nested.is_dir());
        assert_eq!(cache.cache_dir(), nested);
    }

    #[test]
    fn path_layout() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 1);
        let key = cache.key("kokoro", "hi", &Params::new());
        assert_eq!(
            cache.path("kokoro", &key).unwrap(),
            dir.path().join("kokoro").join(format!("{key}.wav"))
        );
    }

    #[test]
    fn rejects_path_escaping_model_names() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 1);
        for bad in ["", ".", "..", "../x", "a/b", "/abs"] {
            assert!(
                matches!(cache.path(bad, "k"), Err(VocoError::InvalidModelName(_))),
                "{bad:?} accepted"
            );
        }
        assert!(cache.clear(Some("..")).is_err());
    }

    #[test]
    fn put_then_get_hits() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 1);
        let p = params(json!({"voice": "af_heart"}));

        assert_eq!(cache.get("kokoro", "hi", &p).unwrap(), None);
        cache.put("kokoro", "hi", b"RIFF1234", &p).unwrap();
        assert_eq!(
            cache.get("kokoro", "hi", &p).unwrap().as_deref(),
            Some(&b"RIFF1234"[..])
        );
        assert_eq!(cache.get("kokoro", "hi", &Params::new()).unwrap(), None);
        assert_eq!(cache.get("other", "hi", &p).unwrap(), None);
    }

    #[test]
    fn null_params_share_entry() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 1);
        cache
            .put("tts", "hi", b"audio", &params(json!({"voice": "x", "seed": null})))
            .unwrap();
        assert!(cache
            .get("tts", "hi", &params(json!({"voice": "x"})))
            .unwrap()
            .is_some());
    }

    #[test]
    fn duplicate_put_overwrites() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 1);
        cache.put("tts", "hi", b"first", &Params::new()).unwrap();
        cache.put("tts", "hi", b"second", &Params::new()).unwrap();
        assert_eq!(
            cache.get("tts", "hi", &Params::new()).unwrap(),
            Some(b"second".to_vec())
        );
        assert_eq!(cache.stats().unwrap().total_entries, 1);
    }

    #[test]
    fn expired_entry_is_removed_on_get() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 1);
        cache.put("tts", "hi", b"audio", &Params::new()).unwrap();
        let path = cache
            .path("tts", &cache.key("tts", "hi", &Params::new()))
            .unwrap();

        set_age(&path, Duration::from_secs(3601));
        assert_eq!(cache.get("tts", "hi", &Params::new()).unwrap(), None);
        assert!(!path.exists());
    }

    #[test]
    fn entry_within_ttl_survives() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 1);
        cache.put("tts", "hi", b"audio", &Params::new()).unwrap();
        let path = cache
            .path("tts", &cache.key("tts", "hi", &Params::new()))
            .unwrap();

        set_age(&path, Duration::from_secs(3000));
        assert!(cache.get("tts", "hi", &Params::new()).unwrap().is_some());
    }

    #[test]
    fn put_evicts_oldest_when_full() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 1);
        let blob = vec![0u8; 300 * 1024];

        for (i, text) in ["a", "b", "c", "d"].iter().enumerate() {
            cache.put("tts", text, &blob, &Params::new()).unwrap();
            let path = cache
                .path("tts", &cache.key("tts", text, &Params::new()))
                .unwrap();
            set_age(&path, Duration::from_secs(100 - i as u64 * 10));
        }
        // 1.2MB on disk, over the 1MB limit.
        assert_eq!(cache.total_size().unwrap(), 4 * blob.len() as u64);

        cache.put("tts", "e", &blob, &Params::new()).unwrap();

        // a and b evicted to get under 70%, then e written.
        assert!(cache.get("tts", "a", &Params::new()).unwrap().is_none());
        assert!(cache.get("tts", "b", &Params::new()).unwrap().is_none());
        for text in ["c", "d", "e"] {
            assert!(cache.get("tts", text, &Params::new()).unwrap().is_some());
        }
        let without_new = cache.total_size().unwrap() - blob.len() as u64;
        assert!(without_new <= (MB as u64) * 7 / 10);
    }

    #[test]
    fn put_below_limit_keeps_everything() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 1);
        let blob = vec![0u8; 300 * 1024];
        // 900KB crosses the 80% warning mark but stays under the limit.
        for text in ["a", "b", "c", "d"] {
            cache.put("tts", text, &blob, &Params::new()).unwrap();
        }
        assert_eq!(cache.stats().unwrap().total_entries, 4);
    }

    #[test]
    fn purge_oldest_spans_models() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 1);
        cache.put("kokoro", "old", &[0u8; 100], &Params::new()).unwrap();
        cache.put("neutts", "new", &[0u8; 100], &Params::new()).unwrap();
        set_age(
            &cache
                .path("kokoro", &cache.key("kokoro", "old", &Params::new()))
                .unwrap(),
            Duration::from_secs(500),
        );

        assert_eq!(cache.purge_oldest(100).unwrap(), 1);
        assert!(cache.get("kokoro", "old", &Params::new()).unwrap().is_none());
        assert!(cache.get("neutts", "new", &Params::new()).unwrap().is_some());
        assert_eq!(cache.purge_oldest(0).unwrap(), 1);
        assert_eq!(cache.total_size().unwrap(), 0);
    }

    #[test]
    fn clear_single_model() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 1);
        cache.put("kokoro", "a", b"1", &Params::new()).unwrap();
        cache.put("neutts", "a", b"2", &Params::new()).unwrap();

        cache.clear(Some("kokoro")).unwrap();
        assert!(!dir.path().join("kokoro").exists());
        assert!(cache.get("neutts", "a", &Params::new()).unwrap().is_some());
        // Clearing an absent model is a no-op.
        cache.clear(Some("kokoro")).unwrap();
    }

    #[test]
    fn clear_all_models() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 1);
        cache.put("kokoro", "a", b"1", &Params::new()).unwrap();
        cache.put("neutts", "a", b"2", &Params::new()).unwrap();
        std::fs::write(dir.path().join("neutts").join("notes.txt"), b"keep").unwrap();

        cache.clear(None).unwrap();
        let stats = cache.stats().unwrap();
        assert_eq!(stats.total_entries, 0);
        assert!(!dir.path().join("kokoro").exists());
        // Non-entry files keep their directory alive without failing the clear.
        assert!(dir.path().join("neutts").join("notes.txt").exists());
    }

    #[test]
    fn stats_match_files_on_disk() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 1);
        cache.put("kokoro", "a", &[0u8; 1000], &Params::new()).unwrap();
        cache.put("kokoro", "b", &[0u8; 500], &Params::new()).unwrap();
        cache.put("neutts", "a", &[0u8; 250], &Params::new()).unwrap();
        std::fs::write(dir.path().join("kokoro").join("stray.tmp"), [0u8; 99]).unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.total_size_bytes, 1750);
        assert_eq!(stats.max_size_bytes, MB as u64);
        assert_eq!(stats.ttl_hours, 1.0);
        assert_eq!(stats.models["kokoro"], ModelStats { size_bytes: 1500, entries: 2 });
        assert_eq!(stats.models["neutts"], ModelStats { size_bytes: 250, entries: 1 });
        assert_eq!(stats.usage_percent, 0.2);
    }

    #[test]
    fn stats_on_missing_directory_are_zero() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 1);
        std::fs::remove_dir_all(dir.path()).unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.total_size_bytes, 0);
        assert_eq!(stats.usage_percent, 0.0);
        assert!(stats.models.is_empty());
    }

    #[test]
    fn zero_limit_reports_zero_usage() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, 0);
        cache.put("tts", "a", b"123", &Params::new()).unwrap();
        let stats = cache.stats().unwrap();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.usage_percent, 0.0);
    }
}
