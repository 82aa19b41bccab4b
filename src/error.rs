/// Errors surfaced by the registry, router, cache and drivers.
#[derive(thiserror::Error, Debug)]
pub enum VocoError {
    #[error("Model '{0}' is already registered. Call unregister() first to replace it.")]
    AlreadyRegistered(String),
    #[error("Model '{name}' not found in registry. Available models: {}", join_or_none(.available))]
    NotFound { name: String, available: Vec<String> },
    #[error("Invalid driver for '{name}': {reason}")]
    InvalidDriver { name: String, reason: String },
    #[error("Alias '{0}' is already in use. Use unload('{0}') first or choose a different alias.")]
    AliasConflict(String),
    #[error("Model alias '{alias}' not found. Available aliases: {}", join_or_none(.available))]
    AliasNotBound { alias: String, available: Vec<String> },
    #[error("Model not loaded. Call load() first.")]
    NotLoaded,
    #[error("Invalid cache config: {0}")]
    InvalidCacheConfig(String),
    #[error("Invalid model name for cache path: {0:?}")]
    InvalidModelName(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("Driver error: {0}")]
    Driver(Box<dyn std::error::Error + Send + Sync>),
}

impl VocoError {
    /// Wrap a driver-specific failure.
    pub fn driver<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Driver(err.into())
    }
}

pub type Result<T, E = VocoError> = std::result::Result<T, E>;

fn join_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}
