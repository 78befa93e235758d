//! The resilient client connection.
//!
//! A [`ConnectionManager`] owns one logical connection to the feed. It
//! reconnects after every failure or close with a fixed delay, sends
//! heartbeat pings while open, and publishes every inbound envelope on the
//! [`EventBus`] as canonical [`StreamEvent`](crate::StreamEvent)s.
//!
//! ## Lifecycle
//!
//! ```text
//!            connect()
//!   Idle ───────────────▶ Connecting ──── Ok(link) ───▶ Open
//!    ▲                        │                          │
//!    │                      Err(_)                   link closed
//!    │                        ▼                          ▼
//!    └──── reconnect delay ◀──┴──────────────────────────┘
//!
//!   disconnect() from any phase ─▶ Idle, timers cancelled, no reconnect
//! ```
//!
//! Every attempt carries a generation number. `disconnect()` and each new
//! attempt advance it, and any task that wakes up holding an older
//! generation does nothing.

mod normalize;

pub use normalize::{normalize, normalize_frame};

use std::sync::{Arc, Weak};
use std::time::Duration;

use flowwatch_types::{now_ms, Envelope};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::EventBus;
use crate::error::TransportError;
use crate::settings::ClientSettings;
use crate::transport::{Connector, Link};

/// Shortest heartbeat period; shorter values are raised to this.
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

/// Where the connection currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Not connected; a reconnect may be pending.
    #[default]
    Idle,
    /// An attempt is in flight.
    Connecting,
    /// A link is open.
    Open,
}

/// One resilient logical connection.
///
/// Cloning yields another handle to the same connection. Dropping the last
/// handle cancels every timer and closes the transport.
///
/// Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    connector: Arc<dyn Connector>,
    bus: EventBus,
    reconnect_delay: Duration,
    heartbeat_interval: Duration,
    connected: watch::Sender<bool>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    phase: Phase,
    generation: u64,
    outbound: Option<mpsc::Sender<String>>,
    attempt: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

impl State {
    fn cancel_tasks(&mut self) {
        for handle in [
            self.attempt.take(),
            self.reconnect.take(),
            self.heartbeat.take(),
            self.reader.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
        self.outbound = None;
    }
}

impl ConnectionManager {
    /// Create a manager using the timings from `settings`.
    pub fn new(settings: &ClientSettings, connector: Arc<dyn Connector>, bus: EventBus) -> Self {
        Self::with_timings(
            connector,
            bus,
            settings.reconnect_delay(),
            settings.heartbeat_interval(),
        )
    }

    /// Create a manager with explicit timings.
    ///
    /// `heartbeat_interval` is raised to at least [`MIN_HEARTBEAT_INTERVAL`].
    pub fn with_timings(
        connector: Arc<dyn Connector>,
        bus: EventBus,
        reconnect_delay: Duration,
        heartbeat_interval: Duration,
    ) -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                connector,
                bus,
                reconnect_delay,
                heartbeat_interval: heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL),
                connected,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Start connecting.
    ///
    /// Does nothing while a link is open or an attempt is in flight. A
    /// pending reconnect is replaced by an immediate attempt.
    pub fn connect(&self) {
        let mut state = self.inner.state.lock();
        if state.phase != Phase::Idle {
            return;
        }
        Inner::start_attempt(&self.inner, &mut state);
    }

    /// Close the connection and stay closed until the next `connect()`.
    pub fn disconnect(&self) {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        state.cancel_tasks();
        let was = std::mem::replace(&mut state.phase, Phase::Idle);
        drop(state);

        self.inner.connected.send_replace(false);
        if was != Phase::Idle {
            info!(endpoint = %self.inner.connector.describe(), "disconnected");
        }
    }

    /// Serialize `message` and send it if a link is open.
    ///
    /// Best effort: returns `false` when nothing was queued.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        match serde_json::to_string(message) {
            Ok(frame) => self.inner.send_frame(frame),
            Err(e) => {
                debug!(error = %e, "failed to encode outbound message");
                false
            }
        }
    }

    /// Whether a link is currently open.
    pub fn is_connected(&self) -> bool {
        *self.inner.connected.borrow()
    }

    /// Watch the connected flag.
    pub fn status(&self) -> watch::Receiver<bool> {
        self.inner.connected.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.inner.connector.describe())
            .field("phase", &self.phase())
            .finish()
    }
}

impl Inner {
    fn start_attempt(this: &Arc<Inner>, state: &mut State) {
        if let Some(reconnect) = state.reconnect.take() {
            reconnect.abort();
        }
        state.generation += 1;
        state.phase = Phase::Connecting;

        let generation = state.generation;
        let weak = Arc::downgrade(this);
        let connector = Arc::clone(&this.connector);
        debug!(generation, endpoint = %connector.describe(), "connecting");

        state.attempt = Some(tokio::spawn(async move {
            let result = connector.connect().await;
            if let Some(inner) = weak.upgrade() {
                inner.finish_attempt(generation, result);
            }
        }));
    }

    fn finish_attempt(self: &Arc<Self>, generation: u64, result: Result<Link, TransportError>) {
        let mut state = self.state.lock();
        if state.generation != generation || state.phase != Phase::Connecting {
            debug!(generation, "discarding stale connection attempt");
            return;
        }
        state.attempt = None;

        match result {
            Ok(link) => {
                state.phase = Phase::Open;
                state.outbound = Some(link.outbound);
                state.reader = Some(self.spawn_reader(generation, link.inbound));
                state.heartbeat = Some(self.spawn_heartbeat(generation));
                self.connected.send_replace(true);
                info!(endpoint = %self.connector.describe(), "connected");
            }
            Err(e) => {
                state.phase = Phase::Idle;
                self.connected.send_replace(false);
                warn!(endpoint = %self.connector.describe(), error = %e, "connection failed");
                self.schedule_reconnect(&mut state);
            }
        }
    }

    fn on_closed(self: &Arc<Self>, generation: u64) {
        let mut state = self.state.lock();
        if state.generation != generation || state.phase != Phase::Open {
            return;
        }

        // The reader is the caller; let it finish on its own
        state.reader = None;
        if let Some(heartbeat) = state.heartbeat.take() {
            heartbeat.abort();
        }
        state.outbound = None;
        state.phase = Phase::Idle;
        self.connected.send_replace(false);
        info!(endpoint = %self.connector.describe(), "connection closed");
        self.schedule_reconnect(&mut state);
    }

    fn schedule_reconnect(self: &Arc<Self>, state: &mut State) {
        if state.reconnect.is_some() {
            return;
        }

        let generation = state.generation;
        let delay = self.reconnect_delay;
        let weak = Arc::downgrade(self);
        info!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");

        state.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut state = inner.state.lock();
            if state.generation != generation || state.phase != Phase::Idle {
                return;
            }
            // This task is finishing; detach rather than abort it
            state.reconnect = None;
            Inner::start_attempt(&inner, &mut state);
        }));
    }

    fn spawn_reader(
        self: &Arc<Self>,
        generation: u64,
        mut inbound: mpsc::Receiver<String>,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if !inner.is_current(generation) {
                    return;
                }
                for event in normalize_frame(&frame) {
                    inner.bus.emit(&event);
                }
            }
            if let Some(inner) = weak.upgrade() {
                inner.on_closed(generation);
            }
        })
    }

    fn spawn_heartbeat(self: &Arc<Self>, generation: u64) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(self);
        let period = self.heartbeat_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if !inner.is_current(generation) {
                    return;
                }
                if let Ok(frame) = Envelope::ping(now_ms()).to_json() {
                    inner.send_frame(frame);
                }
            }
        })
    }

    fn is_current(&self, generation: u64) -> bool {
        let state = self.state.lock();
        state.generation == generation && state.phase == Phase::Open
    }

    fn send_frame(&self, frame: String) -> bool {
        let state = self.state.lock();
        match (&state.phase, &state.outbound) {
            (Phase::Open, Some(outbound)) => outbound.try_send(frame).is_ok(),
            _ => false,
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.state.get_mut().cancel_tasks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, StreamEvent};
    use crate::transport::{ChannelConnector, ChannelPeer};
    use flowwatch_types::ControlMessage;
    use serde_json::Value;

    const RECONNECT: Duration = Duration::from_millis(1500);
    const HEARTBEAT: Duration = Duration::from_millis(20_000);

    fn manager() -> (
        ConnectionManager,
        ChannelConnector,
        mpsc::UnboundedReceiver<ChannelPeer>,
    ) {
        let (connector, peers) = ChannelConnector::create("test");
        let manager = ConnectionManager::with_timings(
            Arc::new(connector.clone()),
            EventBus::new(),
            RECONNECT,
            HEARTBEAT,
        );
        (manager, connector, peers)
    }

    /// Let spawned tasks run without advancing the paused clock.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    async fn advance(duration: Duration) {
        tokio::time::advance(duration).await;
        settle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_opens_link() {
        let (manager, connector, mut peers) = manager();
        let mut status = manager.status();

        manager.connect();
        settle().await;

        assert!(manager.is_connected());
        assert_eq!(manager.phase(), Phase::Open);
        assert!(*status.borrow_and_update());
        assert!(peers.try_recv().is_ok());
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_noop_while_connecting_or_open() {
        let (manager, connector, _peers) = manager();
        connector.set_latency(Duration::from_millis(100));

        manager.connect();
        settle().await;
        manager.connect();
        assert_eq!(manager.phase(), Phase::Connecting);

        advance(Duration::from_millis(100)).await;
        manager.connect();
        settle().await;

        assert!(manager.is_connected());
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_attempt_retries_after_delay() {
        let (manager, connector, _peers) = manager();
        connector.set_available(false);

        manager.connect();
        settle().await;
        assert!(!manager.is_connected());
        assert_eq!(connector.attempts(), 1);

        advance(RECONNECT - Duration::from_millis(1)).await;
        assert_eq!(connector.attempts(), 1);

        connector.set_available(true);
        advance(Duration::from_millis(1)).await;
        assert_eq!(connector.attempts(), 2);
        assert!(manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_unlimited() {
        let (manager, connector, _peers) = manager();
        connector.set_available(false);

        manager.connect();
        settle().await;
        for _ in 0..10 {
            advance(RECONNECT).await;
        }
        assert_eq!(connector.attempts(), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_close_triggers_reconnect() {
        let (manager, connector, mut peers) = manager();

        manager.connect();
        settle().await;
        drop(peers.try_recv().unwrap());
        settle().await;

        assert!(!manager.is_connected());
        assert_eq!(manager.phase(), Phase::Idle);

        advance(RECONNECT).await;
        assert!(manager.is_connected());
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_reconnect() {
        let (manager, connector, _peers) = manager();
        connector.set_available(false);

        manager.connect();
        settle().await;
        manager.disconnect();

        advance(RECONNECT * 3).await;
        assert_eq!(connector.attempts(), 1);
        assert!(!manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_closes_link_without_reconnect() {
        let (manager, connector, mut peers) = manager();

        manager.connect();
        settle().await;
        let peer = peers.try_recv().unwrap();

        manager.disconnect();
        settle().await;
        assert!(peer.is_closed());
        assert!(!manager.is_connected());

        advance(RECONNECT * 2).await;
        assert_eq!(connector.attempts(), 1);

        // connect() works again afterwards
        manager.connect();
        settle().await;
        assert!(manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_attempt_after_disconnect_is_discarded() {
        let (manager, connector, mut peers) = manager();
        connector.set_latency(Duration::from_millis(500));

        manager.connect();
        settle().await;
        manager.disconnect();

        advance(Duration::from_millis(500)).await;
        advance(RECONNECT).await;

        assert!(!manager.is_connected());
        assert_eq!(manager.phase(), Phase::Idle);
        if let Ok(peer) = peers.try_recv() {
            assert!(peer.is_closed());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_timers_coalesce() {
        let (manager, connector, mut peers) = manager();

        manager.connect();
        settle().await;
        drop(peers.try_recv().unwrap());
        settle().await;

        // A manual connect while a reconnect is pending replaces it
        connector.set_available(false);
        manager.connect();
        settle().await;
        assert_eq!(connector.attempts(), 2);

        advance(RECONNECT).await;
        assert_eq!(connector.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_pings_every_interval() {
        let (manager, _connector, mut peers) = manager();

        manager.connect();
        settle().await;
        let mut peer = peers.try_recv().unwrap();

        advance(HEARTBEAT - Duration::from_millis(1)).await;
        assert!(peer.try_recv().is_none());

        advance(Duration::from_millis(1)).await;
        let ping: Value = serde_json::from_str(&peer.try_recv().unwrap()).unwrap();
        assert_eq!(ping["type"], "ping");
        assert!(ping["ts"].is_u64());

        advance(HEARTBEAT).await;
        assert!(peer.try_recv().is_some());
        assert!(peer.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_heartbeat_interval_is_raised() {
        let (connector, mut peers) = ChannelConnector::create("test");
        let manager = ConnectionManager::with_timings(
            Arc::new(connector),
            EventBus::new(),
            RECONNECT,
            Duration::ZERO,
        );

        manager.connect();
        settle().await;
        let mut peer = peers.try_recv().unwrap();

        advance(MIN_HEARTBEAT_INTERVAL).await;
        advance(MIN_HEARTBEAT_INTERVAL).await;
        let mut pings = 0;
        while peer.try_recv().is_some() {
            pings += 1;
        }
        assert!(pings >= 2);
        assert!(manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_stops_after_disconnect() {
        let (manager, _connector, mut peers) = manager();

        manager.connect();
        settle().await;
        let mut peer = peers.try_recv().unwrap();
        manager.disconnect();

        advance(HEARTBEAT * 2).await;
        assert!(peer.try_recv().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_only_while_open() {
        let (manager, connector, mut peers) = manager();
        connector.set_available(false);

        assert!(!manager.send(&ControlMessage::new("OUTAGE")));

        connector.set_available(true);
        manager.connect();
        settle().await;
        let mut peer = peers.try_recv().unwrap();

        assert!(manager.send(&ControlMessage::new("OUTAGE")));
        assert_eq!(peer.recv().await.as_deref(), Some(r#"{"mode":"OUTAGE"}"#));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_frames_reach_bus_in_order() {
        let (manager, _connector, mut peers) = manager();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in [EventKind::Metric, EventKind::Nodes, EventKind::Mode] {
            let seen = seen.clone();
            manager.bus().on(kind, move |event| seen.lock().push(event.clone()));
        }

        manager.connect();
        settle().await;
        let peer = peers.try_recv().unwrap();

        peer.send(r#"{"type":"info","nodes":["NYC"],"mode":"NORMAL"}"#)
            .await
            .unwrap();
        peer.send("not json").await.unwrap();
        peer.send(r#"{"type":"multi-metric","data":[{"node":"NYC","ts":1}]}"#)
            .await
            .unwrap();
        peer.send(r#"{"type":"mode","mode":"OUTAGE"}"#).await.unwrap();
        settle().await;

        let events = seen.lock().clone();
        assert_eq!(events.len(), 5);
        assert_eq!(events[0], StreamEvent::Nodes(vec!["NYC".into()]));
        assert!(matches!(events[1], StreamEvent::Metric(_)));
        assert_eq!(events[1], events[2]);
        assert_eq!(events[3], StreamEvent::Nodes(vec!["NYC".into()]));
        assert_eq!(events[4], StreamEvent::Mode("OUTAGE".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_manager_closes_link() {
        let (manager, connector, mut peers) = manager();

        manager.connect();
        settle().await;
        let peer = peers.try_recv().unwrap();

        drop(manager);
        settle().await;
        assert!(peer.is_closed());

        advance(RECONNECT * 2).await;
        assert_eq!(connector.attempts(), 1);
    }
}
