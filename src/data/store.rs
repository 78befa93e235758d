//! The client-side metric store.

use std::collections::{BTreeMap, HashMap};

use flowwatch_types::MetricSample;
use serde::Serialize;

use super::history::{NodeHistory, DEFAULT_HISTORY_CAPACITY};
use crate::events::StreamEvent;

/// Cross-node mean of the latest sample of every node that has one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    /// Latest timestamp among the contributing samples.
    #[serde(rename = "ts")]
    pub timestamp: u64,
    pub throughput: f64,
    pub latency_ms: f64,
    pub alert_rate: f64,
    pub flow_index: f64,
    /// Number of nodes that contributed.
    pub node_count: usize,
}

/// Serializable dump of the store, for export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreDump {
    pub nodes: Vec<String>,
    pub capacity: usize,
    pub aggregate: Option<Aggregate>,
    pub history: BTreeMap<String, Vec<MetricSample>>,
}

/// Bounded per-node time series with a last-value cache.
///
/// The tracked node list is authoritative: history and last values exist
/// only for tracked nodes. A node is added by [`set_nodes`](Self::set_nodes)
/// or by pushing a sample for it, and removed only when a later `set_nodes`
/// omits it or on [`clear`](Self::clear).
///
/// Samples are stored as given; the store does not re-validate ranges.
#[derive(Debug, Clone)]
pub struct MetricStore {
    capacity: usize,
    nodes: Vec<String>,
    history: HashMap<String, NodeHistory>,
    last: HashMap<String, MetricSample>,
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl MetricStore {
    /// Create an empty store keeping `capacity` samples per node.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            nodes: Vec::new(),
            history: HashMap::new(),
            last: HashMap::new(),
        }
    }

    /// Replace the tracked node order.
    ///
    /// New nodes get empty slots. Nodes no longer listed lose their history
    /// and last value. Duplicate ids keep their first position.
    pub fn set_nodes<I, S>(&mut self, nodes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ordered: Vec<String> = Vec::new();
        for node in nodes {
            let node = node.into();
            if !ordered.contains(&node) {
                ordered.push(node);
            }
        }

        self.history.retain(|node, _| ordered.contains(node));
        self.last.retain(|node, _| ordered.contains(node));
        for node in &ordered {
            self.history
                .entry(node.clone())
                .or_insert_with(|| NodeHistory::new(self.capacity));
        }
        self.nodes = ordered;
    }

    /// Append a sample to its node's history and update the last value.
    pub fn push(&mut self, sample: MetricSample) {
        if !self.nodes.contains(&sample.node) {
            self.nodes.push(sample.node.clone());
        }
        self.history
            .entry(sample.node.clone())
            .or_insert_with(|| NodeHistory::new(self.capacity))
            .push(sample.clone());
        self.last.insert(sample.node.clone(), sample);
    }

    /// Push each sample in order.
    pub fn push_many<I>(&mut self, samples: I)
    where
        I: IntoIterator<Item = MetricSample>,
    {
        for sample in samples {
            self.push(sample);
        }
    }

    /// Apply a bus event. Mode events carry no store state and are ignored.
    pub fn apply(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Metric(sample) => self.push(sample.clone()),
            StreamEvent::Nodes(nodes) => self.set_nodes(nodes.iter().cloned()),
            StreamEvent::Mode(_) => {}
        }
    }

    /// Unweighted mean over the last value of every tracked node that has one.
    pub fn last_aggregate(&self) -> Option<Aggregate> {
        let latest: Vec<&MetricSample> = self
            .nodes
            .iter()
            .filter_map(|node| self.last.get(node))
            .collect();
        if latest.is_empty() {
            return None;
        }

        let n = latest.len() as f64;
        let mean = |field: fn(&MetricSample) -> f64| {
            latest.iter().map(|s| field(s)).sum::<f64>() / n
        };

        Some(Aggregate {
            timestamp: latest.iter().map(|s| s.timestamp).max().unwrap_or(0),
            throughput: mean(|s| s.throughput),
            latency_ms: mean(|s| s.latency_ms),
            alert_rate: mean(|s| s.alert_rate),
            flow_index: mean(|s| s.flow_index),
            node_count: latest.len(),
        })
    }

    /// Every stored sample, ordered by timestamp.
    ///
    /// Ties keep node order, then push order.
    pub fn history_flat(&self) -> Vec<MetricSample> {
        let mut all: Vec<MetricSample> = self
            .nodes
            .iter()
            .filter_map(|node| self.history.get(node))
            .flat_map(|history| history.iter().cloned())
            .collect();
        all.sort_by_key(|s| s.timestamp);
        all
    }

    /// Drop every node, history and last value.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.history.clear();
        self.last.clear();
    }

    /// Tracked nodes, in order.
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn history(&self, node: &str) -> Option<&NodeHistory> {
        self.history.get(node)
    }

    pub fn last(&self, node: &str) -> Option<&MetricSample> {
        self.last.get(node)
    }

    /// Number of tracked nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total samples held across all nodes.
    pub fn sample_count(&self) -> usize {
        self.history.values().map(NodeHistory::len).sum()
    }

    pub fn dump(&self) -> StoreDump {
        StoreDump {
            nodes: self.nodes.clone(),
            capacity: self.capacity,
            aggregate: self.last_aggregate(),
            history: self
                .history
                .iter()
                .map(|(node, history)| (node.clone(), history.to_vec()))
                .collect(),
        }
    }
}
