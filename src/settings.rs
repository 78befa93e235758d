//! Layered client settings.

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::data::DEFAULT_HISTORY_CAPACITY;
use crate::error::SettingsError;

/// Endpoint used when no URL is configured, fixed at build time through
/// `FLOWWATCH_WS_URL`.
pub const DEFAULT_WS_URL: &str = match option_env!("FLOWWATCH_WS_URL") {
    Some(url) => url,
    None => "ws://localhost:8081",
};

/// Environment prefix for client settings, e.g. `FLOWWATCH_WS_URL`.
pub const ENV_PREFIX: &str = "FLOWWATCH";

/// Client settings.
///
/// Layers, lowest precedence first: built-in defaults, an optional settings
/// file, then `FLOWWATCH_*` environment variables. Command-line flags are
/// applied on top by the binary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub ws_url: String,
    pub reconnect_delay_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub history_capacity: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            reconnect_delay_ms: 1500,
            heartbeat_interval_ms: 20_000,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl ClientSettings {
    /// Load settings from an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let defaults = Self::default();

        let mut builder = Config::builder()
            .set_default("ws_url", defaults.ws_url)?
            .set_default("reconnect_delay_ms", defaults.reconnect_delay_ms)?
            .set_default("heartbeat_interval_ms", defaults.heartbeat_interval_ms)?
            .set_default("history_capacity", defaults.history_capacity as u64)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let config = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let settings: Self = config.try_deserialize()?;
        if settings.heartbeat_interval_ms == 0 {
            let message = "heartbeat_interval_ms must be greater than zero";
            return Err(ConfigError::Message(message.into()).into());
        }
        Ok(settings)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}
