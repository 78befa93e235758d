//! # flowwatch-generator
//!
//! Scenario-driven synthetic network telemetry, broadcast over a WebSocket.
//!
//! A [`MetricGenerator`] holds a fixed node set and a mutable scenario mode.
//! Every tick it draws one sample per node from the mode's distributions and
//! broadcasts them as a single `multi-metric` envelope to every connected
//! subscriber. Clients steer the scenario by sending `{"mode": "..."}`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use flowwatch_generator::{server, MetricGenerator, ServerState, Subscribers};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let generator = Arc::new(MetricGenerator::new());
//!     let subscribers = Arc::new(Subscribers::new());
//!
//!     // Start background emission (non-blocking)
//!     let _emission = generator.start(subscribers.clone());
//!
//!     // Serve the feed and HTTP side channel on one port
//!     let listener = server::bind("0.0.0.0:8092").await?;
//!     server::serve(listener, ServerState::new(generator, subscribers)).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Four scenarios**: NORMAL, CONGESTION, OUTAGE and FLAP
//! - **Lossy fan-out**: slow subscribers miss frames, the tick never waits
//! - **Reproducible**: seed the RNG for deterministic sample streams
//! - **Side channel**: `GET /snapshot` and `GET /health` on the feed port

mod error;
mod generator;
mod scenario;
pub mod server;
mod settings;
mod subscribers;

pub use error::{ServerError, SettingsError};
pub use generator::{
    EmissionHandle, GeneratorBuilder, GeneratorSnapshot, MetricGenerator, DEFAULT_INTERVAL,
    DEFAULT_NODES, MIN_INTERVAL,
};
pub use scenario::{ModeProfile, Scenario, Spread};
pub use server::ServerState;
pub use settings::{GeneratorSettings, DEFAULT_PORT, ENV_PREFIX};
pub use subscribers::{SubscriberId, Subscribers, SUBSCRIBER_BUFFER};

// Re-export types for convenience
pub use flowwatch_types::{Envelope, MetricSample, Mode};
