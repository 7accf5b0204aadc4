//! Error types for the Kindly companion

use thiserror::Error;

/// Result type alias for Kindly operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the companion
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or stream error
    #[error("audio error: {0}")]
    Audio(String),

    /// Microphone access was refused by the host
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// No usable audio device
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Text-encoded audio payload could not be decoded
    #[error("decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    /// Outbound packet or tool response could not be delivered
    #[error("transport error: {0}")]
    Transport(String),

    /// Live session protocol violation or server-side error
    #[error("session protocol error: {0}")]
    Protocol(String),

    /// Live session is no longer open
    #[error("session closed")]
    SessionClosed,

    /// External collaborator (music search, news) failed
    #[error("collaborator error: {0}")]
    Collaborator(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
