//! WebSocket connector.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use super::{Connector, Link, LINK_BUFFER};
use crate::error::TransportError;

/// Connects to a WebSocket endpoint.
///
/// Each link runs two bridging tasks. The reader forwards text frames, and
/// binary frames that are valid UTF-8, until the socket closes or errors.
/// The writer sends outbound frames until the link's sender is dropped, then
/// closes the socket.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Link, TransportError> {
        let (ws, _response) = connect_async(self.url.as_str()).await?;
        let (mut sink, mut stream) = ws.split();

        let (inbound_tx, inbound_rx) = mpsc::channel::<String>(LINK_BUFFER);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(LINK_BUFFER);

        // Reader task: socket -> inbound channel
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let frame = match message {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(_) => continue,
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        debug!(error = %e, "websocket read error");
                        break;
                    }
                };
                if inbound_tx.send(frame).await.is_err() {
                    break;
                }
            }
        });

        // Writer task: outbound channel -> socket
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(frame)).await {
                    debug!(error = %e, "websocket write error");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        Ok(Link {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }

    fn describe(&self) -> String {
        format!("websocket: {}", self.url)
    }
}
