//! Broadcast relay transport
//!
//! Speaks Socket.IO over the Engine.IO websocket transport, handles the
//! handshake, heartbeats and reconnection, and forwards cursor lists pushed
//! by the relay. Publishing goes through a bounded queue drained by the
//! connection task so the publish loop never waits on the network.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use super::codec::{self, EnginePacket, OpenHandshake, SocketPacket};
use super::{ConnectionState, Cursor, PublishOutcome, Transport};
use crate::config::RelayConfig;
use crate::position::Position;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Frames waiting for the connection task. At 60 fps this is about a second.
const OUTBOUND_QUEUE: usize = 64;
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);
/// Bounds on the silence allowed before the relay counts as gone. The
/// heartbeat values come from the server and are not trusted as-is.
const MIN_LIVENESS: Duration = Duration::from_secs(1);
const MAX_LIVENESS: Duration = Duration::from_secs(300);

/// Socket.IO relay transport
pub struct RelayTransport {
    endpoint: String,
    config: RelayConfig,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    outbound_tx: mpsc::Sender<String>,
    outbound_rx: Mutex<Option<mpsc::Receiver<String>>>,
    cursors_tx: broadcast::Sender<Vec<Cursor>>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RelayTransport {
    pub fn new(config: &RelayConfig) -> Result<Self> {
        let endpoint = codec::engine_io_endpoint(&config.url, &config.path)?;
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let (cursors_tx, _) = broadcast::channel(16);

        Ok(Self {
            endpoint,
            config: config.clone(),
            state_tx: Arc::new(watch::channel(ConnectionState::Closed).0),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            cursors_tx,
            shutdown_tx: watch::channel(false).0,
            task: Mutex::new(None),
        })
    }

    /// Websocket URL the transport connects to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for RelayTransport {
    fn name(&self) -> &str {
        "relay"
    }

    async fn start(&self) -> Result<()> {
        let outbound = self
            .outbound_rx
            .lock()
            .take()
            .ok_or_else(|| anyhow!("Relay transport already started"))?;

        let connection = RelayConnection {
            endpoint: self.endpoint.clone(),
            namespace: self.config.namespace.clone(),
            cursors_event: self.config.cursors_event.clone(),
            max_delay: Duration::from_millis(self.config.max_reconnect_delay_ms),
            state_tx: Arc::clone(&self.state_tx),
            cursors_tx: self.cursors_tx.clone(),
            shutdown_rx: self.shutdown_tx.subscribe(),
        };

        let handle = tokio::spawn(connection.run(outbound));
        *self.task.lock() = Some(handle);
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    fn publish(&self, position: Position) -> PublishOutcome {
        if self.state() != ConnectionState::Open {
            return PublishOutcome::NotConnected;
        }

        let frame = codec::event_frame(
            &self.config.namespace,
            &self.config.publish_event,
            json!({ "position": position }),
        );

        match self.outbound_tx.try_send(frame) {
            Ok(()) => PublishOutcome::Sent,
            Err(TrySendError::Full(_)) => {
                trace!("Relay outbound queue full, dropping frame");
                PublishOutcome::Backlogged
            }
            Err(TrySendError::Closed(_)) => PublishOutcome::NotConnected,
        }
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx.send_replace(true);

        let handle = self.task.lock().take();
        if let Some(mut handle) = handle {
            if timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
                warn!("Relay connection did not close in time, aborting");
                handle.abort();
            }
        }

        self.state_tx.send_replace(ConnectionState::Closed);
        info!("🔌 Relay transport closed");
        Ok(())
    }

    fn subscribe_cursors(&self) -> Option<broadcast::Receiver<Vec<Cursor>>> {
        Some(self.cursors_tx.subscribe())
    }
}

/// How a connected session ended
enum SessionEnd {
    Shutdown,
    Disconnected,
}

enum Flow {
    Continue,
    Disconnect,
}

/// Background task owning the websocket
struct RelayConnection {
    endpoint: String,
    namespace: String,
    cursors_event: String,
    max_delay: Duration,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    cursors_tx: broadcast::Sender<Vec<Cursor>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl RelayConnection {
    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("Relay connection {:?} → {:?}", previous, state);
        }
    }

    /// Linear backoff capped at `max_delay`
    fn backoff(&self, attempt: u64) -> Duration {
        Duration::from_millis(1000u64.saturating_mul(attempt)).min(self.max_delay)
    }

    async fn run(mut self, mut outbound: mpsc::Receiver<String>) {
        let mut attempt: u64 = 0;

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            self.set_state(ConnectionState::Connecting);
            let result = self.session(&mut outbound).await;
            let was_open = self.state() == ConnectionState::Open;
            self.set_state(ConnectionState::Closed);

            match result {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Disconnected) => warn!("🔌 Relay connection closed"),
                Err(e) => warn!("Relay connection failed: {:#}", e),
            }

            if was_open {
                attempt = 0;
            }
            attempt += 1;
            let delay = self.backoff(attempt);
            debug!("⏳ Relay reconnect #{} in {}ms", attempt, delay.as_millis());

            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.shutdown_rx.changed() => break,
            }
        }

        self.set_state(ConnectionState::Closed);
        debug!("Relay connection task stopped");
    }

    async fn session(&mut self, outbound: &mut mpsc::Receiver<String>) -> Result<SessionEnd> {
        info!("🌐 Connecting to relay at {}", self.endpoint);

        let (ws, _response) = connect_async(self.endpoint.as_str())
            .await
            .context("Failed to connect to relay")?;
        let (mut sink, mut stream) = ws.split();

        let handshake = timeout(HANDSHAKE_TIMEOUT, read_open(&mut stream))
            .await
            .context("Timed out waiting for relay handshake")??;
        debug!(
            "Engine.IO session {} (ping interval {}ms, timeout {}ms)",
            handshake.sid, handshake.ping_interval, handshake.ping_timeout
        );

        sink.send(Message::Text(codec::connect_frame(&self.namespace)))
            .await
            .context("Failed to join relay namespace")?;

        // Frames queued before a disconnect are stale by now
        while outbound.try_recv().is_ok() {}

        let liveness = liveness_window(&handshake);
        let mut deadline = Instant::now() + liveness;

        loop {
            let open = self.state() == ConnectionState::Open;

            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    let _ = sink.send(Message::Text(EnginePacket::Close.encode())).await;
                    let _ = sink.close().await;
                    return Ok(SessionEnd::Shutdown);
                }

                Some(frame) = outbound.recv(), if open => {
                    trace!("→ relay: {}", frame);
                    sink.send(Message::Text(frame))
                        .await
                        .context("Failed to send to relay")?;
                }

                incoming = stream.next() => {
                    deadline = Instant::now() + liveness;
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            if let Flow::Disconnect = self.handle_text(&text, &mut sink).await? {
                                return Ok(SessionEnd::Disconnected);
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!("Relay sent close frame: {:?}", frame);
                            return Ok(SessionEnd::Disconnected);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e).context("Relay websocket error"),
                        None => return Ok(SessionEnd::Disconnected),
                    }
                }

                _ = sleep_until(deadline) => {
                    bail!("Relay stopped responding (nothing received for {}ms)", liveness.as_millis());
                }
            }
        }
    }

    async fn handle_text(&self, text: &str, sink: &mut WsSink) -> Result<Flow> {
        trace!("← relay: {}", text);

        let packet = match EnginePacket::decode(text) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Ignoring relay frame ({}): {}", e, text);
                return Ok(Flow::Continue);
            }
        };

        match packet {
            EnginePacket::Ping(data) => {
                sink.send(Message::Text(EnginePacket::Pong(data).encode()))
                    .await
                    .context("Failed to answer relay ping")?;
            }
            EnginePacket::Close => return Ok(Flow::Disconnect),
            EnginePacket::Message(payload) => return self.handle_socket_packet(&payload),
            _ => {}
        }
        Ok(Flow::Continue)
    }

    fn handle_socket_packet(&self, payload: &str) -> Result<Flow> {
        let packet = match SocketPacket::decode(payload) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Ignoring relay packet ({}): {}", e, payload);
                return Ok(Flow::Continue);
            }
        };

        if packet.namespace() != self.namespace {
            trace!("Ignoring packet for namespace {}", packet.namespace());
            return Ok(Flow::Continue);
        }

        match packet {
            SocketPacket::Connect { .. } => {
                self.set_state(ConnectionState::Open);
                info!("✅ Connected to the relay");
            }
            SocketPacket::ConnectError { data, .. } => {
                let reason = data.map(|d| d.to_string()).unwrap_or_default();
                bail!("Relay refused namespace {}: {}", self.namespace, reason);
            }
            SocketPacket::Disconnect { .. } => {
                info!("Relay closed namespace {}", self.namespace);
                return Ok(Flow::Disconnect);
            }
            SocketPacket::Event { name, args, .. } if name == self.cursors_event => {
                self.forward_cursors(args);
            }
            SocketPacket::Event { name, .. } => trace!("Ignoring relay event '{}'", name),
            SocketPacket::Ack { .. } => {}
        }
        Ok(Flow::Continue)
    }

    fn forward_cursors(&self, mut args: Vec<Value>) {
        if args.is_empty() {
            return;
        }
        match serde_json::from_value::<Vec<Cursor>>(args.swap_remove(0)) {
            Ok(cursors) => {
                trace!("Relay pushed {} cursors", cursors.len());
                // No subscribers is fine
                let _ = self.cursors_tx.send(cursors);
            }
            Err(e) => debug!("Malformed cursor list: {}", e),
        }
    }
}

/// How long the connection may stay silent: one ping interval plus the
/// ping timeout, clamped to sane bounds.
fn liveness_window(handshake: &OpenHandshake) -> Duration {
    let millis = handshake.ping_interval.saturating_add(handshake.ping_timeout);
    let window = Duration::from_millis(millis);
    let clamped = window.clamp(MIN_LIVENESS, MAX_LIVENESS);
    if clamped != window {
        warn!(
            "Relay heartbeat of {}ms + {}ms is out of range, using {}s",
            handshake.ping_interval,
            handshake.ping_timeout,
            clamped.as_secs()
        );
    }
    clamped
}

/// Wait for the Engine.IO open packet
async fn read_open(stream: &mut SplitStream<WsStream>) -> Result<OpenHandshake> {
    while let Some(message) = stream.next().await {
        match message.context("Relay websocket error")? {
            Message::Text(text) => match EnginePacket::decode(&text)? {
                EnginePacket::Open(handshake) => return Ok(handshake),
                other => trace!("Ignoring {:?} before handshake", other),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }
    bail!("Relay closed the connection during handshake")
}
