use std::path::PathBuf;
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VocoError};

/// Shortest allowed entry lifetime (1 hour).
pub const MIN_TTL_SECONDS: u64 = 3_600;

/// Longest allowed entry lifetime (30 days).
pub const MAX_TTL_SECONDS: u64 = 2_592_000;

/// Configuration for the on-disk result cache.
///
/// ```rust
/// use voco_rs::CacheConfigBuilder;
///
/// let config = CacheConfigBuilder::default()
///     .cache_dir("/tmp/voco-cache")
///     .max_size_mb(100u64)
///     .ttl_seconds(3600u64)
///     .build()
///     .unwrap();
/// assert_eq!(config.warn_at_percent, 80);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default, setter(into))]
pub struct CacheConfig {
    /// Root directory. A leading `~` is expanded to the home directory.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Hard size limit; reaching it triggers eviction (default: 500).
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,

    /// Entry lifetime in seconds, within [3600, 2592000] (default: 30 days).
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Percentage of `max_size_mb` at which a warning is logged (default: 80).
    #[serde(default = "default_warn_at_percent")]
    pub warn_at_percent: u8,
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("voco")
}

fn default_max_size_mb() -> u64 {
    500
}

fn default_ttl_seconds() -> u64 {
    MAX_TTL_SECONDS
}

fn default_warn_at_percent() -> u8 {
    80
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            max_size_mb: default_max_size_mb(),
            ttl_seconds: default_ttl_seconds(),
            warn_at_percent: default_warn_at_percent(),
        }
    }
}

impl CacheConfig {
    /// # Errors
    /// [`VocoError::InvalidCacheConfig`] if the TTL is outside
    /// [3600, 2592000] or `warn_at_percent` exceeds 100.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_TTL_SECONDS..=MAX_TTL_SECONDS).contains(&self.ttl_seconds) {
            return Err(VocoError::InvalidCacheConfig(format!(
                "TTL must be between 1 hour ({MIN_TTL_SECONDS}s) and 30 days ({MAX_TTL_SECONDS}s), got {}s",
                self.ttl_seconds
            )));
        }
        if self.warn_at_percent > 100 {
            return Err(VocoError::InvalidCacheConfig(format!(
                "warn_at_percent must be between 0 and 100, got {}",
                self.warn_at_percent
            )));
        }
        Ok(())
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn warn_threshold_bytes(&self) -> u64 {
        (u128::from(self.max_size_bytes()) * u128::from(self.warn_at_percent) / 100) as u64
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// `cache_dir` with a leading `~` replaced by the home directory.
    pub fn resolved_cache_dir(&self) -> PathBuf {
        match self.cache_dir.strip_prefix("~") {
            Ok(rest) => match dirs::home_dir() {
                Some(home) => home.join(rest),
                None => self.cache_dir.clone(),
            },
            Err(_) => self.cache_dir.clone(),
        }
    }
}
