//! Application wiring: connection, bus and store.

use std::sync::Arc;

use flowwatch_types::{ControlMessage, MetricSample};
use parking_lot::RwLock;
use serde::Serialize;

use crate::bus::{EventBus, SubscriptionId};
use crate::connection::ConnectionManager;
use crate::data::{Aggregate, MetricStore, StoreDump};
use crate::events::{EventKind, StreamEvent};
use crate::settings::ClientSettings;
use crate::transport::Connector;

/// Point-in-time view of the client, for periodic reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub connected: bool,
    pub mode: Option<String>,
    pub nodes: Vec<String>,
    pub samples: usize,
    pub aggregate: Option<Aggregate>,
}

/// Main application state.
///
/// Subscribes a [`MetricStore`] and a mode tracker to the bus and drives the
/// connection that feeds it.
pub struct App {
    connection: ConnectionManager,
    store: Arc<RwLock<MetricStore>>,
    mode: Arc<RwLock<Option<String>>>,
    subscriptions: Vec<(EventKind, SubscriptionId)>,
}

impl App {
    pub fn new(settings: &ClientSettings, connector: Arc<dyn Connector>) -> Self {
        let bus = EventBus::new();
        let store = Arc::new(RwLock::new(MetricStore::new(settings.history_capacity)));
        let mode = Arc::new(RwLock::new(None));
        let mut subscriptions = Vec::new();

        for kind in [EventKind::Metric, EventKind::Nodes] {
            let store = store.clone();
            let id = bus.on(kind, move |event| store.write().apply(event));
            subscriptions.push((kind, id));
        }

        let current = mode.clone();
        let id = bus.on(EventKind::Mode, move |event| {
            if let StreamEvent::Mode(mode) = event {
                *current.write() = Some(mode.clone());
            }
        });
        subscriptions.push((EventKind::Mode, id));

        Self {
            connection: ConnectionManager::new(settings, connector, bus),
            store,
            mode,
            subscriptions,
        }
    }

    /// Start connecting.
    pub fn start(&self) {
        self.connection.connect();
    }

    /// Ask the generator to switch scenario.
    ///
    /// Returns `false` if no link was open to carry the request.
    pub fn request_mode(&self, mode: &str) -> bool {
        let mode = mode.to_uppercase();
        let sent = self.connection.send(&ControlMessage::new(mode.as_str()));
        if sent {
            *self.mode.write() = Some(mode);
        }
        sent
    }

    /// Send a queued mode request, if any.
    ///
    /// The request stays queued when no link could carry it. Returns the
    /// mode that was sent.
    pub fn flush_pending_mode(&self, pending: &mut Option<String>) -> Option<String> {
        let mode = pending.take()?;
        if self.request_mode(&mode) {
            Some(mode.to_uppercase())
        } else {
            *pending = Some(mode);
            None
        }
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// The last mode announced by the feed or requested by this client.
    pub fn mode(&self) -> Option<String> {
        self.mode.read().clone()
    }

    pub fn history_flat(&self) -> Vec<MetricSample> {
        self.store.read().history_flat()
    }

    pub fn summary(&self) -> Summary {
        let store = self.store.read();
        Summary {
            connected: self.connection.is_connected(),
            mode: self.mode(),
            nodes: store.nodes().to_vec(),
            samples: store.sample_count(),
            aggregate: store.last_aggregate(),
        }
    }

    pub fn export(&self) -> StoreDump {
        self.store.read().dump()
    }

    /// Disconnect and detach from the bus.
    pub fn shutdown(&mut self) {
        self.connection.disconnect();
        for (kind, id) in self.subscriptions.drain(..) {
            self.connection.bus().off(kind, id);
        }
    }
}
