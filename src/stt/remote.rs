//! Remote transcription over HTTP

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::Transcriber;
use crate::{Error, Result};

const DEEPGRAM_BASE_URL: &str = "https://api.deepgram.com/v1";

/// Request deadline when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Response from an OpenAI-compatible transcription endpoint
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// Remote API flavor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RemoteApi {
    OpenAiCompatible,
    Deepgram,
}

/// Transcribes by posting WAV chunks to a remote worker
pub struct RemoteTranscriber {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    model: String,
    base_url: String,
    api: RemoteApi,
    timeout: Duration,
}

impl RemoteTranscriber {
    /// Client for an OpenAI-compatible worker (OpenAI, a GPU box running
    /// faster-whisper, ...)
    ///
    /// `api_key` may be omitted for self-hosted workers without auth.
    #[must_use]
    pub fn openai_compatible(base_url: &str, model: String, api_key: Option<SecretString>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            api: RemoteApi::OpenAiCompatible,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Client for Deepgram
    ///
    /// # Errors
    ///
    /// Returns error if API key is empty
    pub fn deepgram(api_key: SecretString, model: String) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("Deepgram API key required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key: Some(api_key),
            model,
            base_url: DEEPGRAM_BASE_URL.to_string(),
            api: RemoteApi::Deepgram,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Point the client at a different API root
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Give up on a request after `timeout`, from connect to the last body byte
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// A stalled worker is a transcription failure like any other
    fn request_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Transcription(format!(
                "request timed out after {}ms",
                self.timeout.as_millis()
            ))
        } else {
            Error::from(e)
        }
    }

    /// Transcribe using an OpenAI-compatible endpoint
    async fn transcribe_openai(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting remote transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Transcription(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let mut request = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .timeout(self.timeout)
            .multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            tracing::debug!(error = %e, "transcription request failed");
            self.request_error(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transcription(format!(
                "transcription API error {status}: {body}"
            )));
        }

        let result: WhisperResponse = response.json().await.map_err(|e| self.request_error(e))?;
        Ok(result.text.trim().to_string())
    }

    /// Transcribe using Deepgram
    async fn transcribe_deepgram(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Deepgram transcription");

        let url = format!(
            "{}/listen?model={}&punctuate=true",
            self.base_url, self.model
        );

        let mut request = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("Content-Type", "audio/wav")
            .body(audio.to_vec());
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Token {}", key.expose_secret()));
        }

        let response = request.send().await.map_err(|e| {
            tracing::debug!(error = %e, "Deepgram request failed");
            self.request_error(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transcription(format!(
                "Deepgram API error {status}: {body}"
            )));
        }

        let result: DeepgramResponse = response.json().await.map_err(|e| self.request_error(e))?;

        Ok(result
            .results
            .channels
            .first()
            .and_then(|c| c.alternatives.first())
            .map(|a| a.transcript.trim().to_string())
            .unwrap_or_default())
    }
}

#[async_trait]
impl Transcriber for RemoteTranscriber {
    async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        if wav.is_empty() {
            return Err(Error::Transcription("empty audio".to_string()));
        }

        match self.api {
            RemoteApi::OpenAiCompatible => self.transcribe_openai(wav).await,
            RemoteApi::Deepgram => self.transcribe_deepgram(wav).await,
        }
    }

    fn name(&self) -> &str {
        match self.api {
            RemoteApi::OpenAiCompatible => "remote",
            RemoteApi::Deepgram => "deepgram",
        }
    }
}
