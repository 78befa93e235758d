//! HTTP side channel and WebSocket feed on a single port.
//!
//! Any request asking for a WebSocket upgrade becomes a feed session,
//! whatever its path. Plain HTTP requests are routed as:
//!
//! | route | response |
//! |---|---|
//! | `GET /snapshot` | `{"nodes": [...], "mode": "..."}` |
//! | `GET /`, `GET /health` | `{"ok": true}` |
//! | anything else | 404 |

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{self, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::error::ServerError;
use crate::generator::MetricGenerator;
use crate::subscribers::{Subscribers, SUBSCRIBER_BUFFER};

/// Shared state handed to every connection.
#[derive(Debug, Clone)]
pub struct ServerState {
    pub generator: Arc<MetricGenerator>,
    pub subscribers: Arc<Subscribers>,
}

impl ServerState {
    pub fn new(generator: Arc<MetricGenerator>, subscribers: Arc<Subscribers>) -> Self {
        Self {
            generator,
            subscribers,
        }
    }
}

/// How long a closing session waits for its writer to flush.
const WRITER_DRAIN: Duration = Duration::from_secs(1);

/// Bind a listener on `addr` (`host:port`, host names are resolved).
pub async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    info!(addr = %listener.local_addr()?, "feed server listening");
    Ok(listener)
}

/// Accept connections until the task is dropped.
///
/// Accept errors are logged and do not stop the loop.
pub async fn serve(listener: TcpListener, state: ServerState) -> Result<(), ServerError> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let state = state.clone();
                async move { Ok::<_, Infallible>(route(req, &state)) }
            });

            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service)
                .with_upgrades()
                .await
            {
                debug!(peer = %peer, error = %e, "connection error");
            }
        });
    }
}

/// Route one request.
pub fn route<B: Send + 'static>(req: Request<B>, state: &ServerState) -> Response<Full<Bytes>> {
    if is_websocket_upgrade(&req) {
        return upgrade(req, state.clone());
    }

    match (req.method(), req.uri().path()) {
        (&Method::GET, "/snapshot") => match serde_json::to_string(&state.generator.snapshot()) {
            Ok(body) => json(StatusCode::OK, body),
            Err(e) => text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        },
        (&Method::GET, "/") | (&Method::GET, "/health") => {
            json(StatusCode::OK, r#"{"ok":true}"#.to_string())
        }
        _ => text(StatusCode::NOT_FOUND, "Not Found".to_string()),
    }
}

fn is_websocket_upgrade<B>(req: &Request<B>) -> bool {
    req.headers()
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

fn upgrade<B: Send + 'static>(mut req: Request<B>, state: ServerState) -> Response<Full<Bytes>> {
    let Some(key) = req.headers().get(header::SEC_WEBSOCKET_KEY) else {
        return text(StatusCode::BAD_REQUEST, "Missing Sec-WebSocket-Key".to_string());
    };
    let Ok(accept) = HeaderValue::from_str(&derive_accept_key(key.as_bytes())) else {
        return text(StatusCode::BAD_REQUEST, "Invalid Sec-WebSocket-Key".to_string());
    };

    let on_upgrade = hyper::upgrade::on(&mut req);
    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => {
                let ws =
                    WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None)
                        .await;
                run_session(ws, state).await;
            }
            Err(e) => warn!(error = %e, "websocket upgrade failed"),
        }
    });

    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(header::SEC_WEBSOCKET_ACCEPT, accept);
    response
}

/// Drive one feed session until the peer goes away.
///
/// The `info` envelope is queued before the session is registered, so it is
/// always the first frame the peer sees.
pub async fn run_session<S>(ws: WebSocketStream<S>, state: ServerState)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::channel::<String>(SUBSCRIBER_BUFFER);

    if let Ok(frame) = state.generator.info().to_json() {
        let _ = tx.try_send(frame);
    }
    let id = state.subscribers.register(tx);
    info!(subscriber = id, "session opened");

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if let Some(mode) = state.generator.apply_control(&text) {
                    debug!(subscriber = id, mode = %mode, "control message applied");
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(subscriber = id, error = %e, "session read error");
                break;
            }
        }
    }

    // Drops the last sender, so the writer drains and answers the close
    state.subscribers.unregister(id);
    if tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
        writer.abort();
    }
    info!(subscriber = id, "session closed");
}

fn json(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    respond(status, "application/json", body)
}

fn text(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    respond(status, "text/plain", body)
}

fn respond(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
