//! Synchronous in-process event fan-out.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::events::{EventKind, StreamEvent};

/// Identifier returned by [`EventBus::on`], used to deregister.
pub type SubscriptionId = u64;

type Handler = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

/// Publish/subscribe fan-out keyed by [`EventKind`].
///
/// Handlers run synchronously on the emitting task, in registration order.
/// The handler list is snapshotted before dispatch, so handlers may register
/// or deregister (themselves included) while an event is being delivered;
/// the change takes effect from the next `emit`. A panicking handler is
/// logged and skipped.
///
/// Cloning the bus yields another handle to the same handler table.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<EventKind, Vec<(SubscriptionId, Handler)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handlers
            .write()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Deregister a handler. Returns `true` if it was registered for `kind`.
    pub fn off(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let mut handlers = self.inner.handlers.write();
        let Some(list) = handlers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        before != list.len()
    }

    /// Deliver `event` to every handler registered for its kind.
    pub fn emit(&self, event: &StreamEvent) {
        let kind = event.kind();
        let handlers: Vec<Handler> = match self.inner.handlers.read().get(&kind) {
            Some(list) => list.iter().map(|(_, handler)| handler.clone()).collect(),
            None => return,
        };

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                warn!(kind = ?kind, "event handler panicked");
            }
        }
    }

    /// Number of handlers registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.inner
            .handlers
            .read()
            .get(&kind)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.inner.handlers.read();
        f.debug_struct("EventBus")
            .field("handlers", &handlers.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}
