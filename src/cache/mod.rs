//! Content-addressed cache of generated audio.
//!
//! # Layout
//!
//! ```text
//! <cache_dir>/
//! ├── kokoro/
//! │   ├── 9f6fe73c...d88120d.wav
//! │   └── ...
//! └── tts/
//!     └── ...
//! ```
//!
//! Each file holds the raw bytes of one generation. The file name is the
//! SHA-256 [`cache_key`] of the request; there is no manifest.

pub mod config;
pub mod key;
pub mod store;

pub use config::{CacheConfig, CacheConfigBuilder, MAX_TTL_SECONDS, MIN_TTL_SECONDS};
pub use key::cache_key;
pub use store::{AudioCache, CacheStats, ModelStats};
