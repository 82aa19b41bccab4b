//! The driver contract.
//!
//! A driver wraps one text-to-speech model behind a uniform lifecycle:
//!
//! ```text
//! Unloaded --load()--> Loaded --generate()*--> Loaded --unload()--> Unloaded
//! ```
//!
//! `generate()` on an unloaded driver fails with [`VocoError::NotLoaded`];
//! `unload()` on an unloaded driver is a no-op.

use std::fmt;

use crate::config::{DriverConfig, Params};
use crate::error::{Result, VocoError};
use crate::SynthesisResult;

/// One piece of a chunked generation.
#[derive(Debug, Clone, Default)]
pub struct AudioChunk {
    /// Source text this chunk was synthesized from.
    pub graphemes: Option<String>,
    /// Phoneme string fed to the model, if the driver exposes it.
    pub phonemes: Option<String>,
    /// Audio for this chunk. Some drivers emit text-only chunks.
    pub audio: Option<SynthesisResult>,
}

impl AudioChunk {
    pub fn audio(audio: SynthesisResult) -> Self {
        Self {
            audio: Some(audio),
            ..Default::default()
        }
    }
}

/// A finite, pull-based, one-shot sequence of chunks.
pub type ChunkStream = Box<dyn Iterator<Item = Result<AudioChunk>> + Send>;

/// The output of [`SynthesisDriver::generate`].
pub enum Generation {
    /// A single encoded audio blob.
    Audio(Vec<u8>),
    /// A lazy chunk sequence. It can only be consumed once.
    Chunks(ChunkStream),
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio(bytes) => f.debug_tuple("Audio").field(&bytes.len()).finish(),
            Self::Chunks(_) => f.write_str("Chunks(..)"),
        }
    }
}

impl Generation {
    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio(_))
    }

    /// Collect the generation into bytes.
    ///
    /// Chunk streams are drained and their audio assembled into a WAV blob; a
    /// stream without any audio yields an empty vector.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            Self::Audio(bytes) => Ok(bytes),
            Self::Chunks(stream) => {
                let mut acc = AudioAccumulator::default();
                for chunk in stream {
                    acc.push(&chunk?)?;
                }
                match acc.finish() {
                    Some(audio) => audio.to_wav_bytes(),
                    None => Ok(Vec::new()),
                }
            }
        }
    }
}

/// Concatenates the audio payloads of a chunk sequence.
#[derive(Debug, Default)]
pub struct AudioAccumulator {
    combined: Option<SynthesisResult>,
}

impl AudioAccumulator {
    pub fn push(&mut self, chunk: &AudioChunk) -> Result<()> {
        let Some(audio) = &chunk.audio else {
            return Ok(());
        };
        match &mut self.combined {
            Some(combined) => combined.append(audio),
            None => {
                self.combined = Some(audio.clone());
                Ok(())
            }
        }
    }

    /// The assembled audio, or `None` if no chunk carried any.
    pub fn finish(self) -> Option<SynthesisResult> {
        self.combined
    }
}

/// Common interface for text-to-speech model drivers.
///
/// Drivers are built by a registered constructor from a [`DriverConfig`] and
/// must start out unloaded.
pub trait SynthesisDriver: Send {
    /// The normalised construction arguments.
    fn config(&self) -> &DriverConfig;

    fn device(&self) -> &str {
        &self.config().device
    }

    fn dtype(&self) -> &str {
        &self.config().dtype
    }

    /// Acquire model resources. Irrecoverable setup errors are returned as-is.
    fn load(&mut self) -> Result<()>;

    /// Synthesize speech for `text`.
    fn generate(&mut self, text: &str, params: &Params) -> Result<Generation>;

    /// Release model resources. Must be idempotent.
    fn unload(&mut self) -> Result<()>;

    fn is_loaded(&self) -> bool;

    /// `Err(NotLoaded)` unless the driver is loaded.
    fn ensure_loaded(&self) -> Result<()> {
        if self.is_loaded() {
            Ok(())
        } else {
            Err(VocoError::NotLoaded)
        }
    }
}
