//! Envelope normalization.

use flowwatch_types::{Envelope, MetricSample, WireSample, DEFAULT_NODE};

use crate::events::StreamEvent;

/// Turn one decoded envelope into the canonical events it stands for.
///
/// - `multi-metric`: entries without a string node are dropped. One metric
///   event per remaining entry, then the first entry's event again for
///   single-series consumers, then a nodes event with this batch's nodes.
/// - `metric`: one metric event; a missing node becomes `"DEFAULT"`.
/// - `info`: a nodes event.
/// - `mode`: a mode event.
/// - anything else: nothing.
pub fn normalize(envelope: Envelope) -> Vec<StreamEvent> {
    match envelope {
        Envelope::MultiMetric { data } => {
            let samples: Vec<MetricSample> =
                data.into_iter().filter_map(WireSample::into_sample).collect();
            let nodes: Vec<String> = samples.iter().map(|s| s.node.clone()).collect();
            let first = samples.first().cloned();

            let mut events: Vec<StreamEvent> =
                samples.into_iter().map(StreamEvent::Metric).collect();
            if let Some(first) = first {
                events.push(StreamEvent::Metric(first));
            }
            events.push(StreamEvent::Nodes(nodes));
            events
        }
        Envelope::Metric(wire) => vec![StreamEvent::Metric(wire.into_sample_or(DEFAULT_NODE))],
        Envelope::Info { nodes, .. } => vec![StreamEvent::Nodes(nodes)],
        Envelope::Mode { mode } => vec![StreamEvent::Mode(mode)],
        Envelope::Ping { .. } | Envelope::Unrecognized => Vec::new(),
    }
}

/// Decode a text frame and normalize it.
pub fn normalize_frame(frame: &str) -> Vec<StreamEvent> {
    normalize(Envelope::decode(frame))
}
