//! Configuration management for voicedrive
//!
//! Every setting resolves env > TOML file > built-in default.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::drive::{ANGULAR_SPEED, DEFAULT_STOP_DELAY, DriveEncoding, LINEAR_SPEED, MqttSettings};
use crate::stt::SttProvider;
use crate::voice::TtsProvider;
use crate::{Error, Result};

use self::file::ConfigFile;

/// Default OpenAI-compatible transcription root
pub const DEFAULT_STT_URL: &str = "https://api.openai.com/v1";

/// Default Gemini REST root
pub const DEFAULT_LLM_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// voicedrive configuration
#[derive(Debug)]
pub struct Config {
    /// Broker connection
    pub mqtt: MqttSettings,

    /// Drive command rendering and timing
    pub drive: DriveConfig,

    /// Microphone and speaker settings
    pub audio: AudioConfig,

    /// Speech-to-text backend
    pub transcription: TranscriptionConfig,

    /// Text-to-speech backend
    pub tts: TtsConfig,

    /// Reply generation
    pub llm: LlmConfig,

    /// HTTP API server
    pub server: ServerConfig,

    /// API keys
    pub api_keys: ApiKeys,

    /// Path to data directory (database, phrase cache)
    pub data_dir: PathBuf,
}

/// Drive command settings
#[derive(Debug, Clone)]
pub struct DriveConfig {
    pub encoding: DriveEncoding,
    /// Time a movement runs before the automatic stop
    pub stop_delay: Duration,
    pub linear_speed: f64,
    pub angular_speed: f64,
}

/// Audio capture settings
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Device name substrings to prefer, in order
    pub preferred_devices: Vec<String>,
    pub sample_rate: u32,
    /// Length of the window handed to transcription
    pub chunk_length: Duration,
    /// Length of each capture slice
    pub stream_chunk: Duration,
    /// Capacity of the capture → loop queue
    pub queue_depth: usize,
}

/// Speech-to-text settings
#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    pub provider: SttProvider,
    pub model: String,
    /// Root of the OpenAI-compatible worker
    pub base_url: String,
    /// ggml model for the local provider
    pub model_path: Option<PathBuf>,
    /// Transcribe intermediate windows (logged only)
    pub partials: bool,
    /// Deadline for one remote transcription request
    pub timeout: Duration,
}

/// Text-to-speech settings
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub provider: TtsProvider,
    pub voice: String,
    pub model: String,
    /// Phrases kept as WAV files in the data directory
    pub cached_phrases: Vec<String>,
}

/// Reply generation settings
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub base_url: String,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Origin allowed by CORS
    pub cors_origin: String,
}

/// API keys for external services
#[derive(Debug, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (transcription and TTS)
    pub openai: Option<SecretString>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<SecretString>,

    /// `ElevenLabs` API key (TTS)
    pub elevenlabs: Option<SecretString>,

    /// Gemini API key (replies)
    pub gemini: Option<SecretString>,
}

fn copy_secret(secret: Option<&SecretString>) -> Option<SecretString> {
    secret.map(|s| SecretString::from(s.expose_secret().to_string()))
}

impl ApiKeys {
    #[must_use]
    pub fn openai(&self) -> Option<SecretString> {
        copy_secret(self.openai.as_ref())
    }

    #[must_use]
    pub fn deepgram(&self) -> Option<SecretString> {
        copy_secret(self.deepgram.as_ref())
    }

    #[must_use]
    pub fn elevenlabs(&self) -> Option<SecretString> {
        copy_secret(self.elevenlabs.as_ref())
    }

    #[must_use]
    pub fn gemini(&self) -> Option<SecretString> {
        copy_secret(self.gemini.as_ref())
    }
}

/// Default data directory (`~/.local/share/voicedrive` on Linux)
#[must_use]
pub fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("voicedrive"))
}

fn secs(value: f64, field: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .ok()
        .filter(|d| !d.is_zero())
        .ok_or_else(|| Error::Config(format!("{field} must be a positive number of seconds")))
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a setting is invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        let config = Self::resolve(fc, &|key| std::env::var(key).ok())?;

        // Ensure data dir exists
        std::fs::create_dir_all(&config.data_dir).ok();

        Ok(config)
    }

    /// Resolve settings from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a setting is invalid
    #[allow(clippy::too_many_lines)]
    pub fn resolve(fc: ConfigFile, env: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        // Broker (env > toml > default)
        let defaults = MqttSettings::default();
        let mqtt = MqttSettings {
            host: env("VOICEDRIVE_MQTT_HOST")
                .or(fc.mqtt.host)
                .unwrap_or(defaults.host),
            port: env("VOICEDRIVE_MQTT_PORT")
                .and_then(|s| s.parse().ok())
                .or(fc.mqtt.port)
                .unwrap_or(defaults.port),
            client_id: fc.mqtt.client_id.unwrap_or(defaults.client_id),
            keep_alive: fc
                .mqtt
                .keep_alive_secs
                .map_or(defaults.keep_alive, Duration::from_secs),
            reconnect_delay: fc
                .mqtt
                .reconnect_delay_ms
                .map_or(defaults.reconnect_delay, Duration::from_millis),
        };

        // Drive
        let encoding = env("VOICEDRIVE_DRIVE_ENCODING")
            .or(fc.drive.encoding)
            .map(|s| s.parse::<DriveEncoding>())
            .transpose()?
            .unwrap_or_default();
        let drive = DriveConfig {
            encoding,
            stop_delay: fc
                .drive
                .stop_delay_ms
                .map_or(DEFAULT_STOP_DELAY, Duration::from_millis),
            linear_speed: fc.drive.linear_speed.unwrap_or(LINEAR_SPEED),
            angular_speed: fc.drive.angular_speed.unwrap_or(ANGULAR_SPEED),
        };

        // Audio
        let audio = AudioConfig {
            preferred_devices: fc
                .audio
                .preferred_devices
                .unwrap_or_else(|| vec!["Jieli".to_string(), "UACDemoV1.0".to_string()]),
            sample_rate: fc.audio.sample_rate.unwrap_or(crate::voice::SAMPLE_RATE),
            chunk_length: secs(
                fc.audio.chunk_length_secs.unwrap_or(3.0),
                "audio.chunk_length_secs",
            )?,
            stream_chunk: secs(
                fc.audio.stream_chunk_secs.unwrap_or(1.0),
                "audio.stream_chunk_secs",
            )?,
            queue_depth: fc.audio.queue_depth.unwrap_or(8),
        };

        // Transcription
        let provider = env("VOICEDRIVE_STT_PROVIDER")
            .or(fc.transcription.provider)
            .map(|s| s.parse::<SttProvider>())
            .transpose()?
            .unwrap_or_default();
        let transcription = TranscriptionConfig {
            provider,
            model: env("VOICEDRIVE_STT_MODEL")
                .or(fc.transcription.model)
                .unwrap_or_else(|| provider.default_model().to_string()),
            base_url: env("VOICEDRIVE_STT_URL")
                .or(fc.transcription.base_url)
                .unwrap_or_else(|| DEFAULT_STT_URL.to_string()),
            model_path: env("VOICEDRIVE_STT_MODEL_PATH")
                .or(fc.transcription.model_path)
                .map(PathBuf::from),
            partials: fc.transcription.partials.unwrap_or(false),
            timeout: fc
                .transcription
                .timeout_ms
                .map_or(audio.chunk_length * 2, Duration::from_millis),
        };

        // Speech output
        let tts_provider = fc
            .tts
            .provider
            .map(|s| s.parse::<TtsProvider>())
            .transpose()?
            .unwrap_or_default();
        let tts = TtsConfig {
            provider: tts_provider,
            voice: fc
                .tts
                .voice
                .unwrap_or_else(|| tts_provider.default_voice().to_string()),
            model: fc
                .tts
                .model
                .unwrap_or_else(|| tts_provider.default_model().to_string()),
            cached_phrases: fc.tts.cached_phrases.unwrap_or_else(|| {
                vec![
                    "wow".to_string(),
                    "uhhhhhhhhh lemme think about that".to_string(),
                ]
            }),
        };

        let llm = LlmConfig {
            model: env("VOICEDRIVE_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or_else(|| "gemini-2.0-flash".to_string()),
            base_url: fc.llm.base_url.unwrap_or_else(|| DEFAULT_LLM_URL.to_string()),
        };

        let server = ServerConfig {
            port: env("VOICEDRIVE_PORT")
                .and_then(|s| s.parse().ok())
                .or(fc.server.port)
                .unwrap_or(8000),
            cors_origin: fc
                .server
                .cors_origin
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
        };

        // API keys (env > toml > None)
        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY")
                .or(fc.api_keys.openai)
                .map(SecretString::from),
            deepgram: env("DEEPGRAM_API_KEY")
                .or(fc.api_keys.deepgram)
                .map(SecretString::from),
            elevenlabs: env("ELEVENLABS_API_KEY")
                .or(fc.api_keys.elevenlabs)
                .map(SecretString::from),
            gemini: env("GEMINI_API_KEY")
                .or(fc.api_keys.gemini)
                .map(SecretString::from),
        };

        let data_dir = env("VOICEDRIVE_DATA_DIR").map_or_else(default_data_dir, PathBuf::from);

        let config = Self {
            mqtt,
            drive,
            audio,
            transcription,
            tts,
            llm,
            server,
            api_keys,
            data_dir,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("audio.sample_rate must be positive".to_string()));
        }
        if self.audio.stream_chunk > self.audio.chunk_length {
            return Err(Error::Config(
                "audio.stream_chunk_secs must not exceed audio.chunk_length_secs".to_string(),
            ));
        }
        if self.audio.queue_depth == 0 {
            return Err(Error::Config("audio.queue_depth must be at least 1".to_string()));
        }
        if self.drive.stop_delay.is_zero() {
            return Err(Error::Config("drive.stop_delay_ms must be positive".to_string()));
        }
        if !self.drive.linear_speed.is_finite() || !self.drive.angular_speed.is_finite() {
            return Err(Error::Config(
                "drive.linear_speed and drive.angular_speed must be finite".to_string(),
            ));
        }
        if self.transcription.timeout.is_zero() {
            return Err(Error::Config("transcription.timeout_ms must be positive".to_string()));
        }
        Ok(())
    }

    /// Path of the design database
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("designs.db")
    }

    /// Directory of cached phrase audio
    #[must_use]
    pub fn phrase_cache_dir(&self) -> PathBuf {
        self.data_dir.join("phrases")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn resolve_with(fc: ConfigFile, vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::resolve(fc, &|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = resolve_with(ConfigFile::default(), &[]).unwrap();

        assert_eq!(config.mqtt.host, "localhost");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.drive.encoding, DriveEncoding::Token);
        assert_eq!(config.drive.stop_delay, Duration::from_secs(1));
        assert_eq!(config.audio.preferred_devices, ["Jieli", "UACDemoV1.0"]);
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.chunk_length, Duration::from_secs(3));
        assert_eq!(config.audio.stream_chunk, Duration::from_secs(1));
        assert_eq!(config.transcription.provider, SttProvider::Remote);
        assert_eq!(config.transcription.model, "whisper-1");
        assert_eq!(config.transcription.base_url, DEFAULT_STT_URL);
        assert!(!config.transcription.partials);
        assert_eq!(config.transcription.timeout, Duration::from_secs(6));
        assert_eq!(config.tts.provider, TtsProvider::ElevenLabs);
        assert_eq!(config.tts.voice, "Josh");
        assert_eq!(config.llm.model, "gemini-2.0-flash");
        assert_eq!(config.server.port, 8000);
        assert!(config.api_keys.openai.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let fc: ConfigFile = toml::from_str(
            r#"
            [mqtt]
            host = "robot.local"
            port = 1884

            [drive]
            encoding = "velocity"
            stop_delay_ms = 500

            [transcription]
            provider = "deepgram"

            [tts]
            provider = "openai"
            "#,
        )
        .unwrap();

        let config = resolve_with(fc, &[]).unwrap();
        assert_eq!(config.mqtt.host, "robot.local");
        assert_eq!(config.mqtt.port, 1884);
        assert_eq!(config.drive.encoding, DriveEncoding::Velocity);
        assert_eq!(config.drive.stop_delay, Duration::from_millis(500));
        assert_eq!(config.transcription.provider, SttProvider::Deepgram);
        assert_eq!(config.transcription.model, "nova-2");
        assert_eq!(config.tts.provider, TtsProvider::OpenAI);
        assert_eq!(config.tts.voice, "alloy");
        assert_eq!(config.tts.model, "tts-1");
    }

    #[test]
    fn test_env_overrides_file() {
        let fc: ConfigFile = toml::from_str(
            r#"
            [mqtt]
            host = "robot.local"

            [api_keys]
            openai = "from-file"
            gemini = "g-file"
            "#,
        )
        .unwrap();

        let config = resolve_with(
            fc,
            &[
                ("VOICEDRIVE_MQTT_HOST", "10.0.0.7"),
                ("VOICEDRIVE_PORT", "9001"),
                ("OPENAI_API_KEY", "from-env"),
                ("VOICEDRIVE_DATA_DIR", "/var/lib/voicedrive"),
            ],
        )
        .unwrap();

        assert_eq!(config.mqtt.host, "10.0.0.7");
        assert_eq!(config.server.port, 9001);
        assert_eq!(config.api_keys.openai().unwrap().expose_secret(), "from-env");
        assert_eq!(config.api_keys.gemini().unwrap().expose_secret(), "g-file");
        assert_eq!(config.db_path(), PathBuf::from("/var/lib/voicedrive/designs.db"));
    }

    #[test]
    fn test_blank_env_ignored() {
        let config = resolve_with(ConfigFile::default(), &[("VOICEDRIVE_MQTT_HOST", "  ")]).unwrap();
        assert_eq!(config.mqtt.host, "localhost");
    }

    #[test]
    fn test_invalid_encoding_rejected() {
        let result = resolve_with(ConfigFile::default(), &[("VOICEDRIVE_DRIVE_ENCODING", "morse")]);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_slice_longer_than_window_rejected() {
        let fc: ConfigFile = toml::from_str(
            r"
            [audio]
            chunk_length_secs = 1.0
            stream_chunk_secs = 2.0
            ",
        )
        .unwrap();
        assert!(resolve_with(fc, &[]).is_err());
    }

    #[test]
    fn test_negative_duration_rejected() {
        let fc: ConfigFile = toml::from_str("[audio]\nchunk_length_secs = -3.0\n").unwrap();
        assert!(resolve_with(fc, &[]).is_err());
    }

    #[test]
    fn test_transcription_timeout_from_file() {
        let fc: ConfigFile = toml::from_str("[transcription]\ntimeout_ms = 2500\n").unwrap();
        let config = resolve_with(fc, &[]).unwrap();
        assert_eq!(config.transcription.timeout, Duration::from_millis(2500));

        let fc: ConfigFile = toml::from_str("[transcription]\ntimeout_ms = 0\n").unwrap();
        assert!(matches!(resolve_with(fc, &[]), Err(Error::Config(_))));
    }

    #[test]
    fn test_non_finite_speed_rejected() {
        for speeds in ["linear_speed = nan", "angular_speed = inf", "linear_speed = -inf"] {
            let fc: ConfigFile = toml::from_str(&format!("[drive]\n{speeds}\n")).unwrap();
            assert!(
                matches!(resolve_with(fc, &[]), Err(Error::Config(_))),
                "{speeds}"
            );
        }
    }
}
