//! Error types for the client.

use thiserror::Error;

/// Errors that can occur when establishing or using a transport link.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The link could not be established.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The WebSocket handshake or stream failed.
    #[error("WebSocket error: {0}")]
    Protocol(#[from] tokio_tungstenite::tungstenite::Error),

    /// The other end of the link is gone.
    #[error("Link closed")]
    Closed,
}

/// Settings could not be loaded or deserialized.
#[derive(Debug, Error)]
#[error("Invalid settings: {0}")]
pub struct SettingsError(#[from] pub config::ConfigError);
