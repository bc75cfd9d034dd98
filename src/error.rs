//! Error types for the Beacon voice client

use thiserror::Error;

use crate::voice::RecognitionErrorKind;

/// Result type alias for Beacon voice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Beacon voice client
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Recognition engine reported an error
    #[error("recognition error: {0}")]
    Recognition(RecognitionErrorKind),

    /// Playback attempted before audio output was unlocked
    #[error("audio output is locked until voice responses are enabled")]
    AudioLocked,

    /// Playback failed on the output device
    #[error("playback error: {0}")]
    Playback(String),

    /// Audio payload could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Agent channel error (send failure, malformed reply, disconnect, timeout)
    #[error("channel error: {0}")]
    Channel(String),

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
}

impl Error {
    /// Short message suitable for the status surface
    #[must_use]
    pub fn status_message(&self) -> String {
        match self {
            Self::Recognition(kind) => kind.status_message().to_string(),
            Self::AudioLocked => "Voice responses locked - press Enter to enable".to_string(),
            Self::Playback(_) | Self::Decode(_) | Self::Audio(_) => {
                "Audio playback failed".to_string()
            }
            Self::Channel(_) => "Agent unavailable - still listening".to_string(),
            other => other.to_string(),
        }
    }
}
