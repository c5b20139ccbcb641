//! Error types for the Qin bot

use thiserror::Error;

/// Result type alias for Qin operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Qin bot
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing credential, unnamed extension)
    #[error("configuration error: {0}")]
    Config(String),

    /// Media URL could not be resolved to a playable track
    #[error("resolution error: {0}")]
    Resolution(String),

    /// Requested voice channel does not exist
    #[error("voice channel not found: {0}")]
    ChannelNotFound(String),

    /// Media stream failed while opening or reading
    #[error("stream error: {0}")]
    Stream(String),

    /// Playback failed after the stream was bound to the voice connection
    #[error("dispatcher error: {0}")]
    Dispatcher(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Chat transport error
    #[error("transport error: {0}")]
    Transport(String),

    /// Playback engine is no longer running
    #[error("playback engine stopped: {0}")]
    EngineStopped(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
