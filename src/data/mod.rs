//! Bounded per-node time series and derived views.
//!
//! ## Submodules
//!
//! - [`history`]: Fixed-capacity series for one node ([`NodeHistory`])
//! - [`store`]: The multi-node [`MetricStore`] with last-value cache and aggregation
//!
//! ## Data Flow
//!
//! ```text
//! StreamEvent (from the EventBus)
//!        │
//!        ▼
//! MetricStore::apply()
//!        │
//!        ├──▶ Metric ──▶ push() ──▶ NodeHistory + last value
//!        │
//!        └──▶ Nodes  ──▶ set_nodes() (drops untracked nodes)
//! ```

pub mod history;
pub mod store;

pub use history::{NodeHistory, DEFAULT_HISTORY_CAPACITY};
pub use store::{Aggregate, MetricStore, StoreDump};
