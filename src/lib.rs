//! # voco-rs
//!
//! A Rust library that routes text-to-speech requests to pluggable model
//! drivers, with an optional disk-backed result cache.
//!
//! ## Features
//!
//! - **Model registry**: drivers register a constructor under a model-type name
//! - **Router**: loaded drivers are bound to caller-chosen aliases
//! - **Result cache**: repeated requests are served from disk, keyed by a
//!   SHA-256 fingerprint of (model, text, parameters), with TTL expiry and
//!   size-bounded eviction
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use voco_rs::{AudioRouter, CacheConfig, ModelRegistry, Params};
//!
//! let registry = Arc::new(ModelRegistry::new());
//! registry.register("kokoro", |config| Ok(Box::new(KokoroDriver::new(config))))?;
//!
//! let mut router = AudioRouter::with_cache(registry, CacheConfig::default())?;
//! router.load("kokoro", Some("tts"), None, None, Params::new())?;
//!
//! let audio = router.infer("tts", "Hello, world!", Params::new())?.into_bytes()?;
//! # Ok::<(), voco_rs::VocoError>(())
//! ```

pub mod cache;
pub mod config;
pub mod device;
pub mod driver;
pub mod error;
pub mod registry;
pub mod router;

pub use cache::{cache_key, AudioCache, CacheConfig, CacheConfigBuilder, CacheStats, ModelStats};
pub use config::{merge_options, DriverConfig, Params};
pub use driver::{AudioChunk, ChunkStream, Generation, SynthesisDriver};
pub use error::{Result, VocoError};
pub use registry::{DriverConstructor, ModelRegistry};
pub use router::{AudioRouter, LoadedModel, UnloadFailure};

use std::io::Cursor;
use std::path::Path;

/// Decoded audio: mono f32 samples plus their sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisResult {
    /// Raw audio samples as f32 values
    pub samples: Vec<f32>,
    /// Sample rate of the audio
    pub sample_rate: u32,
}

impl SynthesisResult {
    fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        }
    }

    /// Write the audio to a 32-bit float WAV file.
    pub fn write_wav(&self, path: &Path) -> Result<()> {
        let mut writer = hound::WavWriter::create(path, self.wav_spec())?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }

    /// Encode the audio as an in-memory 32-bit float WAV blob.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, self.wav_spec())?;
            for &sample in &self.samples {
                writer.write_sample(sample)?;
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }

    /// Decode a mono WAV blob. Integer formats are scaled into [-1.0, 1.0].
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self> {
        let reader = hound::WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();
        if spec.channels != 1 {
            return Err(hound::Error::Unsupported.into());
        }

        let samples = match spec.sample_format {
            hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
        })
    }

    /// Append another chunk of audio. Both must share a sample rate.
    pub fn append(&mut self, other: &SynthesisResult) -> Result<()> {
        if other.sample_rate != self.sample_rate {
            return Err(VocoError::driver(format!(
                "sample rate mismatch: {} vs {}",
                self.sample_rate, other.sample_rate
            )));
        }
        self.samples.extend_from_slice(&other.samples);
        Ok(())
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}
