//! In-memory connector.
//!
//! Hands the remote end of every link to the caller, which plays the server.
//! Useful for embedding and for driving the connection manager in tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Connector, Link, LINK_BUFFER};
use crate::error::TransportError;

/// A connector producing in-memory links.
///
/// # Example
///
/// ```
/// use flowwatch::ChannelConnector;
///
/// // Create a connector and the receiver of its remote ends
/// let (connector, peers) = ChannelConnector::create("in-memory");
/// connector.set_available(false);
/// ```
#[derive(Debug, Clone)]
pub struct ChannelConnector {
    inner: Arc<ChannelInner>,
}

#[derive(Debug)]
struct ChannelInner {
    description: String,
    available: AtomicBool,
    attempts: AtomicUsize,
    latency: Mutex<Duration>,
    peers: mpsc::UnboundedSender<ChannelPeer>,
}

impl ChannelConnector {
    /// Create a connector and the receiver of its peers.
    ///
    /// Every successful `connect` sends the remote end of the new link to
    /// the returned receiver.
    pub fn create(description: &str) -> (Self, mpsc::UnboundedReceiver<ChannelPeer>) {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        let connector = Self {
            inner: Arc::new(ChannelInner {
                description: format!("channel: {}", description),
                available: AtomicBool::new(true),
                attempts: AtomicUsize::new(0),
                latency: Mutex::new(Duration::ZERO),
                peers: peers_tx,
            }),
        };
        (connector, peers_rx)
    }

    /// Make subsequent attempts succeed or fail.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Delay every attempt by `latency` before it resolves.
    pub fn set_latency(&self, latency: Duration) {
        *self.inner.latency.lock() = latency;
    }

    /// Number of `connect` calls so far.
    pub fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    async fn connect(&self) -> Result<Link, TransportError> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);

        let latency = *self.inner.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if !self.inner.available.load(Ordering::SeqCst) {
            return Err(TransportError::Connect(format!(
                "{} is unavailable",
                self.inner.description
            )));
        }

        let (to_client, inbound) = mpsc::channel(LINK_BUFFER);
        let (outbound, from_client) = mpsc::channel(LINK_BUFFER);
        self.inner
            .peers
            .send(ChannelPeer {
                to_client,
                from_client,
            })
            .map_err(|_| TransportError::Connect("peer receiver dropped".to_string()))?;

        Ok(Link { outbound, inbound })
    }

    fn describe(&self) -> String {
        self.inner.description.clone()
    }
}

/// The remote end of an in-memory link.
///
/// Dropping the peer closes the link from the remote side.
#[derive(Debug)]
pub struct ChannelPeer {
    to_client: mpsc::Sender<String>,
    from_client: mpsc::Receiver<String>,
}

impl ChannelPeer {
    /// Send a frame to the client.
    pub async fn send(&self, frame: impl Into<String>) -> Result<(), TransportError> {
        self.to_client
            .send(frame.into())
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Receive the next frame the client sent. `None` once the client closed
    /// the link.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Receive a frame without waiting.
    pub fn try_recv(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Whether the client has dropped its end of the link.
    pub fn is_closed(&self) -> bool {
        self.to_client.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_link_carries_frames_both_ways() {
        let (connector, mut peers) = ChannelConnector::create("test");
        let mut link = connector.connect().await.unwrap();
        let mut peer = peers.recv().await.unwrap();

        peer.send("hello").await.unwrap();
        assert_eq!(link.inbound.recv().await.as_deref(), Some("hello"));

        link.outbound.send("ping".to_string()).await.unwrap();
        assert_eq!(peer.recv().await.as_deref(), Some("ping"));
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_connector_fails() {
        let (connector, mut peers) = ChannelConnector::create("test");
        connector.set_available(false);

        assert!(matches!(
            connector.connect().await,
            Err(TransportError::Connect(_))
        ));
        assert!(peers.try_recv().is_err());
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test]
    async fn test_dropping_peer_closes_inbound() {
        let (connector, mut peers) = ChannelConnector::create("test");
        let mut link = connector.connect().await.unwrap();
        drop(peers.recv().await.unwrap());

        assert_eq!(link.inbound.recv().await, None);
    }

    #[tokio::test]
    async fn test_dropping_link_closes_peer() {
        let (connector, mut peers) = ChannelConnector::create("test");
        let link = connector.connect().await.unwrap();
        let mut peer = peers.recv().await.unwrap();

        drop(link);
        assert!(peer.is_closed());
        assert_eq!(peer.recv().await, None);
        assert!(matches!(peer.send("late").await, Err(TransportError::Closed)));
    }
}
