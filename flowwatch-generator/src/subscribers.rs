//! Registry of connected feed subscribers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc;

/// Frames buffered per subscriber before new frames are dropped.
pub const SUBSCRIBER_BUFFER: usize = 32;

/// Identifier handed out by [`Subscribers::register`].
pub type SubscriberId = u64;

/// Thread-safe set of open subscriber queues.
///
/// Broadcasting never waits: a subscriber whose queue is full misses the
/// frame, and one whose receiver is gone is pruned.
#[derive(Debug, Default)]
pub struct Subscribers {
    next_id: AtomicU64,
    inner: RwLock<BTreeMap<SubscriberId, mpsc::Sender<String>>>,
}

impl Subscribers {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue, register its sending half, and return the receiver.
    pub fn subscribe(&self) -> (SubscriberId, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        (self.register(tx), rx)
    }

    /// Register an existing sender.
    pub fn register(&self, sender: mpsc::Sender<String>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.write().insert(id, sender);
        id
    }

    /// Remove a subscriber. Returns `true` if it was registered.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        self.inner.write().remove(&id).is_some()
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Offer `frame` to every open subscriber.
    ///
    /// Returns how many subscribers accepted it.
    pub fn broadcast(&self, frame: &str) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        {
            let subscribers = self.inner.read();
            for (id, sender) in subscribers.iter() {
                if sender.is_closed() {
                    closed.push(*id);
                    continue;
                }
                // Best effort: a full queue just misses this frame
                if sender.try_send(frame.to_string()).is_ok() {
                    delivered += 1;
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = self.inner.write();
            for id in closed {
                subscribers.remove(&id);
            }
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_reaches_every_subscriber() {
        let subscribers = Subscribers::new();
        let (_, mut a) = subscribers.subscribe();
        let (_, mut b) = subscribers.subscribe();

        assert_eq!(subscribers.broadcast("frame"), 2);
        assert_eq!(a.try_recv().unwrap(), "frame");
        assert_eq!(b.try_recv().unwrap(), "frame");
    }

    #[test]
    fn test_closed_subscribers_are_pruned() {
        let subscribers = Subscribers::new();
        let (_, rx) = subscribers.subscribe();
        let (_, mut open) = subscribers.subscribe();
        drop(rx);

        assert_eq!(subscribers.broadcast("frame"), 1);
        assert_eq!(subscribers.len(), 1);
        assert_eq!(open.try_recv().unwrap(), "frame");
    }

    #[test]
    fn test_full_queue_drops_frames() {
        let subscribers = Subscribers::new();
        let (_, mut rx) = subscribers.subscribe();

        for i in 0..SUBSCRIBER_BUFFER + 5 {
            subscribers.broadcast(&i.to_string());
        }

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, SUBSCRIBER_BUFFER);
    }

    #[test]
    fn test_unregister() {
        let subscribers = Subscribers::new();
        let (id, _rx) = subscribers.subscribe();

        assert!(subscribers.unregister(id));
        assert!(!subscribers.unregister(id));
        assert!(subscribers.is_empty());
        assert_eq!(subscribers.broadcast("frame"), 0);
    }
}
