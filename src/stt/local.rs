//! In-process transcription with whisper.cpp

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::Transcriber;
use crate::voice::{SAMPLE_RATE, resample_linear, wav_to_samples};
use crate::{Error, Result};

/// Local whisper model
///
/// Inference runs on the blocking pool; the loop awaits one call at a time.
pub struct WhisperTranscriber {
    context: Arc<WhisperContext>,
    language: String,
}

impl WhisperTranscriber {
    /// Load a ggml model from disk
    ///
    /// # Errors
    ///
    /// Returns error if the file is missing or the model fails to load
    pub fn load(model_path: &Path) -> Result<Self> {
        if !model_path.exists() {
            return Err(Error::Config(format!(
                "whisper model not found: {}",
                model_path.display()
            )));
        }

        let path = model_path
            .to_str()
            .ok_or_else(|| Error::Config("invalid model path".to_string()))?;

        tracing::info!(model = %model_path.display(), "loading whisper model");
        let context = WhisperContext::new_with_params(path, WhisperContextParameters::default())
            .map_err(|e| Error::Transcription(format!("failed to load whisper model: {e:?}")))?;

        Ok(Self {
            context: Arc::new(context),
            language: "en".to_string(),
        })
    }

    fn run(context: &WhisperContext, language: &str, samples: &[f32]) -> Result<String> {
        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(language));
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        let mut state = context
            .create_state()
            .map_err(|e| Error::Transcription(format!("failed to create state: {e:?}")))?;

        state
            .full(params, samples)
            .map_err(|e| Error::Transcription(format!("inference failed: {e:?}")))?;

        let segments = state
            .full_n_segments()
            .map_err(|e| Error::Transcription(format!("failed to get segments: {e:?}")))?;

        let mut text = String::new();
        for i in 0..segments {
            let segment = state
                .full_get_segment_text(i)
                .map_err(|e| Error::Transcription(format!("failed to get segment: {e:?}")))?;
            text.push_str(&segment);
        }

        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        let (samples, rate) = wav_to_samples(wav)?;
        if samples.is_empty() {
            return Err(Error::Transcription("empty audio".to_string()));
        }
        let samples = resample_linear(&samples, rate, SAMPLE_RATE)?;

        let context = Arc::clone(&self.context);
        let language = self.language.clone();

        tokio::task::spawn_blocking(move || Self::run(&context, &language, &samples))
            .await
            .map_err(|e| Error::Transcription(format!("inference task failed: {e}")))?
    }

    fn name(&self) -> &str {
        "local"
    }
}
