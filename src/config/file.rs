//! TOML configuration file loading
//!
//! Supports `~/.config/voicedrive/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub mqtt: MqttFileConfig,

    #[serde(default)]
    pub drive: DriveFileConfig,

    #[serde(default)]
    pub audio: AudioFileConfig,

    #[serde(default)]
    pub transcription: TranscriptionFileConfig,

    #[serde(default)]
    pub tts: TtsFileConfig,

    #[serde(default)]
    pub llm: LlmFileConfig,

    #[serde(default)]
    pub server: ServerFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Broker connection
#[derive(Debug, Default, Deserialize)]
pub struct MqttFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub client_id: Option<String>,
    pub keep_alive_secs: Option<u64>,
    pub reconnect_delay_ms: Option<u64>,
}

/// Drive command rendering and timing
#[derive(Debug, Default, Deserialize)]
pub struct DriveFileConfig {
    /// "token" or "velocity"
    pub encoding: Option<String>,
    pub stop_delay_ms: Option<u64>,
    pub linear_speed: Option<f64>,
    pub angular_speed: Option<f64>,
}

/// Microphone and speaker settings
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Device name substrings to prefer, in order
    pub preferred_devices: Option<Vec<String>>,
    pub sample_rate: Option<u32>,
    pub chunk_length_secs: Option<f64>,
    pub stream_chunk_secs: Option<f64>,
    pub queue_depth: Option<usize>,
}

/// Speech-to-text backend
#[derive(Debug, Default, Deserialize)]
pub struct TranscriptionFileConfig {
    /// "remote", "deepgram" or "local"
    pub provider: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub model_path: Option<String>,
    pub partials: Option<bool>,
    /// Remote request deadline; defaults to twice the window length
    pub timeout_ms: Option<u64>,
}

/// Text-to-speech backend
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// "elevenlabs" or "openai"
    pub provider: Option<String>,
    pub voice: Option<String>,
    pub model: Option<String>,
    pub cached_phrases: Option<Vec<String>>,
}

/// Reply generation
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    pub model: Option<String>,
    pub base_url: Option<String>,
}

/// HTTP API server
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub port: Option<u16>,
    pub cors_origin: Option<String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub deepgram: Option<String>,
    pub elevenlabs: Option<String>,
    pub gemini: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ConfigFile {
    config_file_path().map_or_else(ConfigFile::default, |path| load_config_from(&path))
}

/// Load a TOML config file from `path`
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_from(path: &Path) -> ConfigFile {
    if !path.exists() {
        return ConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/voicedrive/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("voicedrive").join("config.toml"))
}
