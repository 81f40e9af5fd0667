//! Spoken output: synthesis, phrase cache and local playback

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::playback::{AudioPlayback, decode_audio};
use super::tts::TextToSpeech;
use super::wav::samples_to_wav;
use crate::command::normalize;
use crate::{Error, Result};

/// WAV files for frequently spoken phrases
///
/// Only phrases listed at construction are cached; lookups match on the
/// normalized text, so "Wow!" and "wow" share an entry.
#[derive(Debug, Clone)]
pub struct PhraseCache {
    dir: PathBuf,
    phrases: HashSet<String>,
}

impl PhraseCache {
    /// Create a cache in `dir` for the given phrases
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, phrases: &[String]) -> Self {
        Self {
            dir: dir.into(),
            phrases: phrases
                .iter()
                .map(|p| normalize(p))
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Cache directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether `text` is one of the cached phrases
    #[must_use]
    pub fn contains(&self, text: &str) -> bool {
        self.phrases.contains(&normalize(text))
    }

    /// File backing `text`, if it is a cached phrase
    #[must_use]
    pub fn path_for(&self, text: &str) -> Option<PathBuf> {
        let phrase = normalize(text);
        if !self.phrases.contains(&phrase) {
            return None;
        }

        let slug: String = phrase
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        Some(self.dir.join(format!("{slug}.wav")))
    }

    /// Cached WAV bytes for `text`, if present
    pub async fn load(&self, text: &str) -> Option<Vec<u8>> {
        let path = self.path_for(text)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                tracing::debug!(path = %path.display(), "phrase cache hit");
                Some(bytes)
            }
            Err(_) => None,
        }
    }

    /// Store synthesized audio for `text` as WAV
    ///
    /// Does nothing for phrases outside the cache list.
    ///
    /// # Errors
    ///
    /// Returns error if the audio cannot be decoded or the file written
    pub async fn store(&self, text: &str, audio: &[u8]) -> Result<()> {
        let Some(path) = self.path_for(text) else {
            return Ok(());
        };

        let (samples, rate) = decode_audio(audio)?;
        let wav = samples_to_wav(&samples, rate)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, wav).await?;

        tracing::debug!(path = %path.display(), "phrase cached");
        Ok(())
    }
}

/// Turns text into audio and plays it on the preferred output device
pub struct Speaker {
    tts: TextToSpeech,
    cache: PhraseCache,
    preferred_devices: Vec<String>,
    playback: bool,
}

impl Speaker {
    /// Create a speaker
    ///
    /// With `playback` disabled, [`Self::speak`] only returns the audio.
    #[must_use]
    pub const fn new(
        tts: TextToSpeech,
        cache: PhraseCache,
        preferred_devices: Vec<String>,
        playback: bool,
    ) -> Self {
        Self {
            tts,
            cache,
            preferred_devices,
            playback,
        }
    }

    /// Synthesize (or load from cache) and play `text`
    ///
    /// Returns the encoded audio. Playback failures are logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn speak(&self, text: &str) -> Result<Vec<u8>> {
        let audio = match self.cache.load(text).await {
            Some(audio) => audio,
            None => {
                let audio = self.tts.synthesize(text).await?;
                if self.cache.contains(text) {
                    if let Err(e) = self.cache.store(text, &audio).await {
                        tracing::warn!(error = %e, "failed to cache phrase");
                    }
                }
                audio
            }
        };

        if self.playback {
            if let Err(e) = self.play(audio.clone()).await {
                tracing::warn!(error = %e, "playback failed");
            }
        }

        Ok(audio)
    }

    async fn play(&self, audio: Vec<u8>) -> Result<()> {
        let preferred = self.preferred_devices.clone();
        tokio::task::spawn_blocking(move || {
            let playback = AudioPlayback::new(&preferred)?;
            playback.play_encoded(&audio)
        })
        .await
        .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
    }
}
