//! # flowwatch
//!
//! A resilient client for a live per-node network telemetry feed.
//!
//! This crate keeps one logical WebSocket connection to a flowwatch
//! generator alive, normalizes every envelope it receives into canonical
//! events, fans those out over an in-process bus, and keeps a bounded,
//! multi-node time series with cross-node aggregation.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          Application                          │
//! │  ┌────────────┐   ┌─────────────┐   ┌─────────┐    ┌───────┐  │
//! │  │ connection │──▶│  normalize  │──▶│   bus   │───▶│ data  │  │
//! │  │ (resilient)│   │ (envelopes) │   │(fan-out)│    │(store)│  │
//! │  └─────┬──────┘   └─────────────┘   └─────────┘    └───────┘  │
//! │        │                                                      │
//! │        ▼                                                      │
//! │  ┌───────────┐                                                │
//! │  │ transport │◀── WsConnector | ChannelConnector              │
//! │  │  (links)  │                                                │
//! │  └───────────┘                                                │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`connection`]**: [`ConnectionManager`] with fixed-delay reconnect,
//!   heartbeat pings and envelope normalization
//! - **[`transport`]**: the [`Connector`] trait with WebSocket and in-memory
//!   implementations
//! - **[`bus`]**: synchronous, fault-isolated [`EventBus`]
//! - **[`data`]**: [`MetricStore`] with per-node [`NodeHistory`], last values
//!   and aggregation
//! - **[`app`]**: [`App`] wiring the above together
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Follow a feed and log a summary every 5 seconds
//! flowwatch --url ws://localhost:8092
//!
//! # Switch the generator to OUTAGE once connected, dump the store on exit
//! flowwatch --url ws://localhost:8092 --mode outage --export dump.json
//! ```
//!
//! ### As a library
//!
//! ```no_run
//! use std::sync::Arc;
//! use flowwatch::{App, ClientSettings, WsConnector};
//!
//! # async fn run() {
//! let settings = ClientSettings::default();
//! let app = App::new(&settings, Arc::new(WsConnector::new(settings.ws_url.as_str())));
//! app.start();
//!
//! // ... later
//! let summary = app.summary();
//! println!("{} nodes, connected: {}", summary.nodes.len(), summary.connected);
//! # }
//! ```
//!
//! ### With an in-memory link
//!
//! ```
//! use flowwatch::ChannelConnector;
//!
//! // The receiver yields the remote end of every link the connector opens
//! let (connector, peers) = ChannelConnector::create("in-memory");
//! ```

pub mod app;
pub mod bus;
pub mod connection;
pub mod data;
pub mod error;
pub mod events;
pub mod settings;
pub mod transport;

// Re-export main types for convenience
pub use app::{App, Summary};
pub use bus::{EventBus, SubscriptionId};
pub use connection::{ConnectionManager, Phase, MIN_HEARTBEAT_INTERVAL};
pub use data::{Aggregate, MetricStore, NodeHistory, StoreDump};
pub use error::{SettingsError, TransportError};
pub use events::{EventKind, StreamEvent};
pub use settings::{ClientSettings, DEFAULT_WS_URL};
pub use transport::{ChannelConnector, ChannelPeer, Connector, Link, WsConnector};

pub use flowwatch_types::{ControlMessage, Envelope, MetricSample, Mode};
