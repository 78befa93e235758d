//! Bounded per-node sample history.

use std::collections::VecDeque;

use flowwatch_types::MetricSample;

/// Default number of samples kept per node.
pub const DEFAULT_HISTORY_CAPACITY: usize = 600;

/// Fixed-capacity series of samples for one node.
///
/// Samples are kept in push order. Once full, each push evicts the oldest
/// sample.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeHistory {
    samples: VecDeque<MetricSample>,
    capacity: usize,
}

impl Default for NodeHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl NodeHistory {
    /// Create an empty history holding at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            capacity,
        }
    }

    /// Append a sample, evicting from the front until within capacity.
    pub fn push(&mut self, sample: MetricSample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// The most recent sample, if any.
    pub fn latest(&self) -> Option<&MetricSample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn to_vec(&self) -> Vec<MetricSample> {
        self.samples.iter().cloned().collect()
    }
}
