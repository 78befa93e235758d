//! Metric samples, canonical and wire forms.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One telemetry reading for a single node.
///
/// This is the canonical in-process form: the node is always known. On the
/// wire the timestamp is named `ts` and the remaining fields are camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    /// Node (site/region) that produced the reading.
    pub node: String,

    /// Unix timestamp in milliseconds.
    #[serde(rename = "ts")]
    pub timestamp: u64,

    /// Throughput in Mbps.
    pub throughput: f64,

    /// Round-trip latency in milliseconds.
    pub latency_ms: f64,

    /// Fraction of traffic raising alerts, in `[0, 1]`.
    pub alert_rate: f64,

    /// Flow index, in `[0, 1]`.
    pub flow_index: f64,
}

impl MetricSample {
    /// Create a zeroed sample for `node` at `timestamp`.
    pub fn new(node: impl Into<String>, timestamp: u64) -> Self {
        Self {
            node: node.into(),
            timestamp,
            throughput: 0.0,
            latency_ms: 0.0,
            alert_rate: 0.0,
            flow_index: 0.0,
        }
    }

    /// Set the throughput.
    pub fn throughput(mut self, mbps: f64) -> Self {
        self.throughput = mbps;
        self
    }

    /// Set the latency.
    pub fn latency_ms(mut self, ms: f64) -> Self {
        self.latency_ms = ms;
        self
    }

    /// Set the alert rate.
    pub fn alert_rate(mut self, rate: f64) -> Self {
        self.alert_rate = rate;
        self
    }

    /// Set the flow index.
    pub fn flow_index(mut self, index: f64) -> Self {
        self.flow_index = index;
        self
    }
}

/// A sample as it appears on the wire.
///
/// Decoding is lenient: `node` is `None` when the field is missing or not a
/// string, and numeric fields that are missing or not numbers read as zero.
/// Deciding what to do with a node-less sample is up to the consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSample {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    pub ts: u64,
    pub throughput: f64,
    pub latency_ms: f64,
    pub alert_rate: f64,
    pub flow_index: f64,
}

impl WireSample {
    /// Read a sample out of a JSON object.
    pub fn from_value(value: &Value) -> Self {
        Self {
            node: value.get("node").and_then(Value::as_str).map(str::to_string),
            ts: number(value.get("ts")) as u64,
            throughput: number(value.get("throughput")),
            latency_ms: number(value.get("latencyMs")),
            alert_rate: number(value.get("alertRate")),
            flow_index: number(value.get("flowIndex")),
        }
    }

    /// Convert into a canonical sample, or `None` if the node is unknown.
    pub fn into_sample(self) -> Option<MetricSample> {
        let node = self.node.clone()?;
        Some(self.into_sample_or(&node))
    }

    /// Convert into a canonical sample, substituting `default_node` when the
    /// node is unknown.
    pub fn into_sample_or(self, default_node: &str) -> MetricSample {
        MetricSample {
            node: self.node.unwrap_or_else(|| default_node.to_string()),
            timestamp: self.ts,
            throughput: self.throughput,
            latency_ms: self.latency_ms,
            alert_rate: self.alert_rate,
            flow_index: self.flow_index,
        }
    }
}

impl From<MetricSample> for WireSample {
    fn from(sample: MetricSample) -> Self {
        Self {
            node: Some(sample.node),
            ts: sample.timestamp,
            throughput: sample.throughput,
            latency_ms: sample.latency_ms,
            alert_rate: sample.alert_rate,
            flow_index: sample.flow_index,
        }
    }
}

// Float-to-int `as` casts saturate, so negative or huge `ts` values clamp.
fn number(value: Option<&Value>) -> f64 {
    value.and_then(Value::as_f64).unwrap_or(0.0)
}
