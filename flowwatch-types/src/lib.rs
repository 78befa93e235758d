//! # flowwatch-types
//!
//! Wire schema shared by the flowwatch generator and its clients.
//!
//! Everything that crosses the WebSocket is a JSON object discriminated by a
//! `type` field. This crate defines those envelopes, the canonical
//! [`MetricSample`] they carry, and the scenario [`Mode`] names.
//!
//! ## Envelopes
//!
//! | type | fields | direction |
//! |---|---|---|
//! | `info` | `nodes`, `mode` | server → client, on connect |
//! | `multi-metric` | `data: [sample]` | server → client, per tick |
//! | `metric` | sample fields, `node` optional | server → client, legacy |
//! | `mode` | `mode` | server → client |
//! | `ping` | `ts` | client → server |
//!
//! Scenario changes travel client → server as an untyped `{"mode": ...}`
//! object, see [`ControlMessage`].
//!
//! ## Example
//!
//! ```rust
//! use flowwatch_types::{Envelope, MetricSample};
//!
//! let sample = MetricSample::new("NYC", 1_700_000_000_000)
//!     .throughput(850.0)
//!     .latency_ms(42.0);
//!
//! let json = Envelope::multi_metric(vec![sample]).to_json().unwrap();
//!
//! match Envelope::decode(&json) {
//!     Envelope::MultiMetric { data } => assert_eq!(data[0].node.as_deref(), Some("NYC")),
//!     other => panic!("unexpected envelope: {:?}", other),
//! }
//! ```

mod envelope;
mod mode;
mod sample;

pub use envelope::*;
pub use mode::*;
pub use sample::*;

/// Node id used for legacy single-sample envelopes that omit `node`.
pub const DEFAULT_NODE: &str = "DEFAULT";

/// Get current timestamp in milliseconds since Unix epoch.
pub fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
