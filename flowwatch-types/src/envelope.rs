//! Wire envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{MetricSample, Mode, WireSample};

/// One complete wire message, tagged by its `type` field.
///
/// Decoding goes through [`Envelope::decode`], which matches the discriminator
/// strictly and maps anything it does not understand to
/// [`Envelope::Unrecognized`] instead of failing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Envelope {
    /// Current node set and mode, sent once to each new subscriber.
    Info { nodes: Vec<String>, mode: String },

    /// One sample per node for a single tick.
    MultiMetric { data: Vec<WireSample> },

    /// Legacy single-sample envelope.
    Metric(WireSample),

    /// Scenario mode announcement.
    Mode { mode: String },

    /// Client heartbeat.
    Ping { ts: u64 },

    /// Not valid JSON, not an object, or an unknown/missing `type`.
    #[serde(skip)]
    Unrecognized,
}

impl Envelope {
    /// Build an `info` envelope.
    pub fn info(nodes: Vec<String>, mode: impl Into<String>) -> Self {
        Envelope::Info {
            nodes,
            mode: mode.into(),
        }
    }

    /// Build a `multi-metric` envelope from canonical samples.
    pub fn multi_metric(samples: Vec<MetricSample>) -> Self {
        Envelope::MultiMetric {
            data: samples.into_iter().map(WireSample::from).collect(),
        }
    }

    /// Build a `mode` envelope.
    pub fn mode(mode: Mode) -> Self {
        Envelope::Mode {
            mode: mode.as_str().to_string(),
        }
    }

    /// Build a `ping` envelope.
    pub fn ping(ts: u64) -> Self {
        Envelope::Ping { ts }
    }

    /// The wire name of this envelope's type.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Info { .. } => "info",
            Envelope::MultiMetric { .. } => "multi-metric",
            Envelope::Metric(_) => "metric",
            Envelope::Mode { .. } => "mode",
            Envelope::Ping { .. } => "ping",
            Envelope::Unrecognized => "unrecognized",
        }
    }

    /// Serialize to a JSON string.
    ///
    /// Fails for [`Envelope::Unrecognized`], which has no wire form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a text frame.
    pub fn decode(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => Self::from_value(&value),
            Err(_) => Envelope::Unrecognized,
        }
    }

    /// Decode an already-parsed JSON value.
    pub fn from_value(value: &Value) -> Self {
        let Some(kind) = value.get("type").and_then(Value::as_str) else {
            return Envelope::Unrecognized;
        };

        match kind {
            "info" => match value.get("nodes").and_then(Value::as_array) {
                Some(nodes) => Envelope::Info {
                    nodes: nodes
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect(),
                    mode: value
                        .get("mode")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                },
                None => Envelope::Unrecognized,
            },
            "multi-metric" => match value.get("data").and_then(Value::as_array) {
                Some(items) => Envelope::MultiMetric {
                    data: items.iter().map(WireSample::from_value).collect(),
                },
                None => Envelope::Unrecognized,
            },
            "metric" => Envelope::Metric(WireSample::from_value(value)),
            "mode" => match value.get("mode").and_then(Value::as_str) {
                Some(mode) => Envelope::Mode {
                    mode: mode.to_string(),
                },
                None => Envelope::Unrecognized,
            },
            "ping" => Envelope::Ping {
                ts: value.get("ts").and_then(Value::as_f64).unwrap_or(0.0) as u64,
            },
            _ => Envelope::Unrecognized,
        }
    }
}

/// Client → server scenario change request.
///
/// Serializes as an untyped `{"mode": "..."}` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub mode: String,
}

impl ControlMessage {
    /// Request a scenario change.
    pub fn new(mode: impl Into<String>) -> Self {
        Self { mode: mode.into() }
    }
}

impl From<Mode> for ControlMessage {
    fn from(mode: Mode) -> Self {
        Self::new(mode.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_info_wire_format() {
        let envelope = Envelope::info(vec!["NYC".into(), "LA".into()], "NORMAL");
        let value: Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "info", "nodes": ["NYC", "LA"], "mode": "NORMAL"})
        );
    }

    #[test]
    fn test_multi_metric_wire_format() {
        let sample = MetricSample::new("NYC", 1).throughput(10.0);
        let value: Value =
            serde_json::from_str(&Envelope::multi_metric(vec![sample]).to_json().unwrap()).unwrap();

        assert_eq!(value["type"], "multi-metric");
        assert_eq!(value["data"][0]["node"], "NYC");
        assert_eq!(value["data"][0]["ts"], 1);
        assert_eq!(value["data"][0]["latencyMs"], 0.0);
    }

    #[test]
    fn test_metric_is_flattened() {
        let wire = WireSample::from(MetricSample::new("LA", 9));
        let value: Value =
            serde_json::from_str(&Envelope::Metric(wire).to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "metric");
        assert_eq!(value["node"], "LA");
    }

    #[test]
    fn test_ping_wire_format() {
        assert_eq!(
            Envelope::ping(5).to_json().unwrap(),
            r#"{"type":"ping","ts":5}"#
        );
    }

    #[test]
    fn test_unrecognized_does_not_serialize() {
        assert!(Envelope::Unrecognized.to_json().is_err());
    }

    #[test]
    fn test_decode_multi_metric_keeps_nodeless_entries() {
        let text = r#"{"type":"multi-metric","data":[{"node":"NYC","ts":1},{"node":3,"ts":2}]}"#;
        match Envelope::decode(text) {
            Envelope::MultiMetric { data } => {
                assert_eq!(data.len(), 2);
                assert_eq!(data[0].node.as_deref(), Some("NYC"));
                assert_eq!(data[1].node, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_info_skips_non_string_nodes() {
        let envelope = Envelope::decode(r#"{"type":"info","nodes":["A",1,"B"],"mode":"FLAP"}"#);
        assert_eq!(envelope, Envelope::info(vec!["A".into(), "B".into()], "FLAP"));
    }

    #[test]
    fn test_decode_mode() {
        assert_eq!(
            Envelope::decode(r#"{"type":"mode","mode":"OUTAGE"}"#),
            Envelope::mode(Mode::Outage)
        );
    }

    #[test]
    fn test_decode_unrecognized() {
        assert_eq!(Envelope::decode("not json"), Envelope::Unrecognized);
        assert_eq!(Envelope::decode("[1,2]"), Envelope::Unrecognized);
        assert_eq!(Envelope::decode(r#"{"mode":"OUTAGE"}"#), Envelope::Unrecognized);
        assert_eq!(Envelope::decode(r#"{"type":"weather"}"#), Envelope::Unrecognized);
        assert_eq!(Envelope::decode(r#"{"type":"info"}"#), Envelope::Unrecognized);
        assert_eq!(
            Envelope::decode(r#"{"type":"multi-metric","data":{}}"#),
            Envelope::Unrecognized
        );
        assert_eq!(Envelope::decode(r#"{"type":"mode","mode":4}"#), Envelope::Unrecognized);
    }

    #[test]
    fn test_control_message_is_untyped() {
        let json = serde_json::to_string(&ControlMessage::from(Mode::Congestion)).unwrap();
        assert_eq!(json, r#"{"mode":"CONGESTION"}"#);
    }
}
