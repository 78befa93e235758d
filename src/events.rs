//! Canonical in-process events.

use flowwatch_types::MetricSample;

/// One normalized event published on the [`EventBus`](crate::EventBus).
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A single node reading.
    Metric(MetricSample),
    /// The ordered node set, from an `info` envelope or a `multi-metric` batch.
    Nodes(Vec<String>),
    /// A scenario mode announcement, verbatim.
    Mode(String),
}

/// Discriminant used to subscribe to one kind of [`StreamEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Metric,
    Nodes,
    Mode,
}

impl StreamEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            StreamEvent::Metric(_) => EventKind::Metric,
            StreamEvent::Nodes(_) => EventKind::Nodes,
            StreamEvent::Mode(_) => EventKind::Mode,
        }
    }
}
