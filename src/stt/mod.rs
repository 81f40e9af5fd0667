//! Speech-to-text
//!
//! [`Transcriber`] is the one capability the control loop needs: WAV bytes
//! in, text out. Remote workers and local inference both implement it.
//! [`StreamWindow`] turns short capture slices into the partial and final
//! windows that get transcribed.

#[cfg(feature = "local-whisper")]
pub mod local;
pub mod remote;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ApiKeys, TranscriptionConfig};
use crate::voice::AudioChunk;
use crate::{Error, Result};

pub use remote::RemoteTranscriber;

#[cfg(feature = "local-whisper")]
pub use local::WhisperTranscriber;

/// Converts a WAV-encoded chunk to text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Most probable transcription of `wav`, possibly empty
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails
    async fn transcribe(&self, wav: &[u8]) -> Result<String>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Text recognized from a window of audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcription {
    pub text: String,
    /// Only final results may trigger commands
    pub is_final: bool,
}

impl Transcription {
    #[must_use]
    pub const fn partial(text: String) -> Self {
        Self {
            text,
            is_final: false,
        }
    }

    #[must_use]
    pub const fn final_text(text: String) -> Self {
        Self {
            text,
            is_final: true,
        }
    }
}

/// Transcription backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SttProvider {
    /// OpenAI-compatible `/audio/transcriptions` worker
    #[default]
    Remote,
    Deepgram,
    /// In-process whisper.cpp
    Local,
}

impl SttProvider {
    /// Model used when none is configured
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Remote => "whisper-1",
            Self::Deepgram => "nova-2",
            Self::Local => "ggml-base.en",
        }
    }
}

impl FromStr for SttProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "remote" | "openai" | "whisper" => Ok(Self::Remote),
            "deepgram" => Ok(Self::Deepgram),
            "local" => Ok(Self::Local),
            other => Err(Error::Config(format!("unknown transcription provider: {other}"))),
        }
    }
}

/// Build the configured transcriber
///
/// # Errors
///
/// Returns error if a required key or model is missing, or the local
/// provider is requested without the `local-whisper` feature
pub fn build_transcriber(
    config: &TranscriptionConfig,
    keys: &ApiKeys,
) -> Result<Arc<dyn Transcriber>> {
    match config.provider {
        SttProvider::Remote => Ok(Arc::new(
            RemoteTranscriber::openai_compatible(&config.base_url, config.model.clone(), keys.openai())
                .with_timeout(config.timeout),
        )),
        SttProvider::Deepgram => {
            let key = keys
                .deepgram()
                .ok_or_else(|| Error::Config("DEEPGRAM_API_KEY required".to_string()))?;
            Ok(Arc::new(
                RemoteTranscriber::deepgram(key, config.model.clone())?.with_timeout(config.timeout),
            ))
        }
        #[cfg(feature = "local-whisper")]
        SttProvider::Local => {
            let path = config.model_path.as_deref().ok_or_else(|| {
                Error::Config("transcription.model_path required for local provider".to_string())
            })?;
            Ok(Arc::new(WhisperTranscriber::load(path)?))
        }
        #[cfg(not(feature = "local-whisper"))]
        SttProvider::Local => Err(Error::Config(
            "local transcription requires the local-whisper feature".to_string(),
        )),
    }
}

/// Audio ready for transcription
#[derive(Debug, Clone, PartialEq)]
pub struct WindowUpdate {
    /// Sequence number of the newest slice in the window
    pub seq: u64,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Window reached full length; it has been reset
    pub is_final: bool,
}

/// Accumulates capture slices into a fixed-length transcription window
///
/// Each push yields the window so far. Intermediate windows are partial;
/// the push that fills the window yields the final one and starts over.
#[derive(Debug)]
pub struct StreamWindow {
    capacity: usize,
    sample_rate: u32,
    samples: Vec<f32>,
}

impl StreamWindow {
    /// Create a window of `length` at `sample_rate`
    #[must_use]
    pub fn new(sample_rate: u32, length: Duration) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let capacity = ((f64::from(sample_rate) * length.as_secs_f64()).round() as usize).max(1);
        Self {
            capacity,
            sample_rate,
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Samples in a full window
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples buffered toward the next final window
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.samples.len()
    }

    /// Add a slice and return the current window
    pub fn push(&mut self, chunk: &AudioChunk) -> WindowUpdate {
        self.samples.extend_from_slice(&chunk.samples);

        if self.samples.len() >= self.capacity {
            let samples = std::mem::replace(&mut self.samples, Vec::with_capacity(self.capacity));
            return WindowUpdate {
                seq: chunk.seq,
                samples,
                sample_rate: self.sample_rate,
                is_final: true,
            };
        }

        WindowUpdate {
            seq: chunk.seq,
            samples: self.samples.clone(),
            sample_rate: self.sample_rate,
            is_final: false,
        }
    }

    /// Drop any partial window
    pub fn reset(&mut self) {
        self.samples.clear();
    }
}
