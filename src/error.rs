//! Error types for Beacon voice

use thiserror::Error;

/// Result type alias for Beacon voice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Capture device missing or permission denied
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Real-time processing graph could not be installed
    #[error("audio module failed to load: {0}")]
    ModuleLoadFailure(String),

    /// Inbound audio payload could not be decoded
    #[error("malformed playback payload: {0}")]
    MalformedPlaybackPayload(String),

    /// Audio device error outside of acquisition
    #[error("audio error: {0}")]
    Audio(String),

    /// Message channel error
    #[error("transport error: {0}")]
    Transport(String),

    /// Unexpected message on the wire
    #[error("protocol error: {0}")]
    Protocol(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// WebSocket error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
