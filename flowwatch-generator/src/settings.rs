//! Layered generator settings.

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use flowwatch_types::Mode;
use serde::Deserialize;

use crate::error::SettingsError;
use crate::generator::{DEFAULT_INTERVAL, DEFAULT_NODES};

/// Default listen port when neither `PORT` nor settings provide one.
pub const DEFAULT_PORT: u16 = 8092;

/// Environment prefix for generator settings, e.g. `FLOWWATCH_GENERATOR_MODE`.
pub const ENV_PREFIX: &str = "FLOWWATCH_GENERATOR";

/// Generator process settings.
///
/// Layers, lowest precedence first: built-in defaults, an optional settings
/// file, `FLOWWATCH_GENERATOR_*` environment variables, then `PORT`.
/// Command-line flags are applied on top by the binary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GeneratorSettings {
    pub host: String,
    pub port: u16,
    pub interval_ms: u64,
    pub nodes: Vec<String>,
    pub mode: String,
    pub seed: Option<u64>,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            interval_ms: DEFAULT_INTERVAL.as_millis() as u64,
            nodes: DEFAULT_NODES.iter().map(|n| n.to_string()).collect(),
            mode: Mode::Normal.as_str().to_string(),
            seed: None,
        }
    }
}

impl GeneratorSettings {
    /// Load settings from the process environment and an optional file.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        Self::from_sources(path, std::env::var("PORT").ok())
    }

    /// Load settings with an explicit `PORT` value.
    pub fn from_sources(path: Option<&Path>, port: Option<String>) -> Result<Self, SettingsError> {
        let defaults = Self::default();

        let mut builder = Config::builder()
            .set_default("host", defaults.host)?
            .set_default("port", i64::from(defaults.port))?
            .set_default("interval_ms", defaults.interval_ms)?
            .set_default("nodes", defaults.nodes)?
            .set_default("mode", defaults.mode)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("nodes"),
            )
            .set_override_option("port", port)?
            .build()?;

        let settings: Self = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the emission loop cannot run with.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.interval_ms == 0 {
            return Err(ConfigError::Message("interval_ms must be greater than zero".into()).into());
        }
        Ok(())
    }

    /// The `host:port` string to bind.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}
