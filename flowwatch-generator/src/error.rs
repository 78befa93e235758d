//! Error types for the generator server.

use thiserror::Error;

/// Errors that can occur while starting or running the feed server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding the listener failed.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error on the listener.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Settings could not be loaded or deserialized.
#[derive(Debug, Error)]
#[error("Invalid settings: {0}")]
pub struct SettingsError(#[from] pub config::ConfigError);
