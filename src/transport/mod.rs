//! Transport abstraction for the connection manager.
//!
//! A [`Connector`] establishes one [`Link`] per call. The link is a pair of
//! bounded text-frame channels; the transport is considered closed once the
//! inbound channel yields `None`, and dropping the link closes the transport.
//!
//! ## Implementations
//!
//! - [`WsConnector`]: WebSocket client over tokio-tungstenite
//! - [`ChannelConnector`]: in-memory link whose remote end is handed to the
//!   caller as a [`ChannelPeer`]

mod channel;
mod websocket;

pub use channel::{ChannelConnector, ChannelPeer};
pub use websocket::WsConnector;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Frames buffered in each direction of a link.
pub const LINK_BUFFER: usize = 64;

/// One open transport, as seen by the client.
#[derive(Debug)]
pub struct Link {
    /// Frames to send to the remote end.
    pub outbound: mpsc::Sender<String>,
    /// Frames received from the remote end. `None` means the link closed.
    pub inbound: mpsc::Receiver<String>,
}

/// Establishes transport links.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new link.
    async fn connect(&self) -> Result<Link, TransportError>;

    /// Human-readable description of the endpoint.
    fn describe(&self) -> String;
}
