//! Error types for voicedrive

use thiserror::Error;

/// Result type alias for voicedrive operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in voicedrive
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// No usable audio device (fatal at startup)
    #[error("audio device not found: {0}")]
    DeviceNotFound(String),

    /// Audio stream or codec error
    #[error("audio error: {0}")]
    Audio(String),

    /// Drive channel is not connected
    #[error("drive channel unavailable: {0}")]
    ChannelUnavailable(String),

    /// Speech-to-text error
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Text generation error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Movement request named an unknown direction
    #[error("invalid direction: {0}")]
    InvalidDirection(String),

    /// Request body failed validation
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
