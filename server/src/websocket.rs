//! WebSocket handler for the two-party relay
//!
//! Per connection the protocol runs `Unregistered → Active → Closed`:
//!
//! - **Unregistered**: the first data frame must be `register`. Anything else,
//!   an undecodable frame, or the registration deadline passing closes the
//!   connection before it touches shared state.
//! - **Active**: `send` stores and best-effort delivers, `get_history` replays
//!   one conversation, unknown actions are ignored. An undecodable frame
//!   closes the connection.
//! - **Closed**: the identity is dropped from the registry, unless a newer
//!   connection has registered it in the meantime.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use tandem_shared::{ClientFrame, Codec, ConversationKey, Frame, Identity, Message, ServerEvent};

use crate::config::ServerConfig;
use crate::registry::{ConnectionHandle, ConnectionRegistry, Delivery};
use crate::store::ConversationStore;

/// How long a closing connection waits for its writer to flush
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Server state
// ---------------------------------------------------------------------------

/// Relay state shared across connections
pub struct ServerState {
    pub config: ServerConfig,
    /// Conversation history
    pub store: ConversationStore,
    /// Identity → live connection
    pub registry: ConnectionRegistry,
    /// Current WebSocket connection count (for enforcing max_connections)
    connection_count: AtomicUsize,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            store: ConversationStore::new(),
            registry: ConnectionRegistry::new(),
            connection_count: AtomicUsize::new(0),
        }
    }

    /// Number of open WebSocket connections, registered or not
    pub fn connection_count(&self) -> usize {
        self.connection_count.load(Ordering::Relaxed)
    }

    /// Try to take a connection slot. Returns None if the limit is reached.
    fn try_acquire_connection(self: &Arc<Self>) -> Option<ConnectionSlot> {
        let max = self.config.max_connections;
        let acquired = self
            .connection_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (max == 0 || current < max).then_some(current + 1)
            })
            .is_ok();
        acquired.then(|| ConnectionSlot { state: self.clone() })
    }
}

/// Held for the lifetime of a connection; frees its slot on drop.
struct ConnectionSlot {
    state: Arc<ServerState>,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.state.connection_count.fetch_sub(1, Ordering::AcqRel);
    }
}

// ---------------------------------------------------------------------------
// WebSocket upgrade handler
// ---------------------------------------------------------------------------

/// Handle WebSocket upgrade, enforcing the connection limit before accepting
pub async fn handle_websocket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    let Some(slot) = state.try_acquire_connection() else {
        warn!("Connection rejected for {}: limit exceeded", addr);
        return axum::http::StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state, addr, slot))
        .into_response()
}

// ---------------------------------------------------------------------------
// Socket lifecycle
// ---------------------------------------------------------------------------

async fn handle_socket(socket: WebSocket, state: Arc<ServerState>, addr: SocketAddr, _slot: ConnectionSlot) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    debug!("New WebSocket connection from {}", addr);

    // Unregistered
    let deadline = Instant::now() + state.config.register_timeout();
    let (identity, codec) = match await_registration(&mut ws_receiver, deadline).await {
        Ok(registration) => registration,
        Err(e) => {
            warn!("Closing unregistered connection from {}: {}", addr, e);
            let _ = ws_sender.close().await;
            return;
        }
    };

    let (tx, rx) = mpsc::channel::<ServerEvent>(state.config.outbound_buffer);
    let handle = ConnectionHandle::new(tx);
    let connection_id = handle.id();
    let ping_interval = Duration::from_secs(state.config.ws_ping_interval);
    let forward_task = tokio::spawn(forward_events(ws_sender, rx, codec, ping_interval));

    if let Some(displaced) = state.registry.register(identity.clone(), handle.clone()) {
        info!(
            "User {} re-registered from {}; connection {} displaced",
            identity,
            addr,
            displaced.id()
        );
    }
    info!("User {} connected from {} (connection {}, {:?})", identity, addr, connection_id, codec);

    // Active
    match replay_history(&state, &identity, &handle).await {
        Ok(0) => {}
        Ok(n) => debug!("Replayed {} conversations to {}", n, identity),
        Err(e) => warn!("History replay to {} failed: {}", identity, e),
    }

    loop {
        let frame = match ws_receiver.next().await {
            Some(Ok(msg)) => match classify(msg) {
                Inbound::Data(frame) => frame,
                Inbound::Control => continue,
                Inbound::Close => break,
            },
            Some(Err(e)) => {
                debug!("WebSocket error from {}: {}", identity, e);
                break;
            }
            None => break,
        };

        if let Err(e) = handle_frame(&frame, &identity, &handle, &state).await {
            warn!("Closing connection for {}: {}", identity, e);
            break;
        }
    }

    // Closed
    if state.registry.remove(&identity, connection_id) {
        info!("User {} disconnected ({})", identity, addr);
    } else {
        debug!("Replaced connection {} for {} closed ({})", connection_id, identity, addr);
    }

    // Dropping the last sender lets the writer flush and send a close frame
    drop(handle);
    let mut forward_task = forward_task;
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut forward_task).await.is_err() {
        forward_task.abort();
    }
}

/// Wait for the first data frame and require it to be `register`
async fn await_registration(
    receiver: &mut SplitStream<WebSocket>,
    deadline: Instant,
) -> anyhow::Result<(Identity, Codec)> {
    loop {
        let next = tokio::time::timeout_at(deadline, receiver.next())
            .await
            .map_err(|_| anyhow::anyhow!("registration timed out"))?;

        let frame = match next {
            Some(Ok(msg)) => match classify(msg) {
                Inbound::Data(frame) => frame,
                Inbound::Control => continue,
                Inbound::Close => anyhow::bail!("closed before registering"),
            },
            Some(Err(e)) => anyhow::bail!("transport error before registering: {}", e),
            None => anyhow::bail!("closed before registering"),
        };

        return match frame.decode::<ClientFrame>()? {
            ClientFrame::Register { username } => Ok((username, frame.codec())),
            other => anyhow::bail!("expected register as first frame, got {}", other.action()),
        };
    }
}

/// Forward queued events to the socket, with periodic pings
async fn forward_events(
    mut ws_sender: SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::Receiver<ServerEvent>,
    codec: Codec,
    ping_interval: Duration,
) {
    let mut ping_ticker = tokio::time::interval(ping_interval);
    ping_ticker.tick().await; // skip first immediate tick

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    let _ = ws_sender.send(WsMessage::Close(None)).await;
                    break;
                };
                let frame = match codec.encode(&event) {
                    Ok(frame) => frame,
                    Err(e) => {
                        error!("Failed to encode outbound event: {}", e);
                        continue;
                    }
                };
                if ws_sender.send(into_ws(frame)).await.is_err() {
                    break;
                }
            }
            _ = ping_ticker.tick() => {
                if ws_sender.send(WsMessage::Ping(vec![])).await.is_err() {
                    break;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Frame helpers
// ---------------------------------------------------------------------------

enum Inbound {
    Data(Frame),
    Control,
    Close,
}

fn classify(msg: WsMessage) -> Inbound {
    match msg {
        WsMessage::Text(text) => Inbound::Data(Frame::Text(text)),
        WsMessage::Binary(data) => Inbound::Data(Frame::Binary(data)),
        WsMessage::Close(_) => Inbound::Close,
        // axum answers pings itself
        WsMessage::Ping(_) | WsMessage::Pong(_) => Inbound::Control,
    }
}

fn into_ws(frame: Frame) -> WsMessage {
    match frame {
        Frame::Text(text) => WsMessage::Text(text),
        Frame::Binary(data) => WsMessage::Binary(data),
    }
}

// ---------------------------------------------------------------------------
// Protocol handler
// ---------------------------------------------------------------------------

/// Handle one frame from an Active connection. An error means the frame was
/// malformed and the connection must close.
async fn handle_frame(
    frame: &Frame,
    identity: &Identity,
    handle: &ConnectionHandle,
    state: &ServerState,
) -> anyhow::Result<()> {
    match frame.decode::<ClientFrame>()? {
        ClientFrame::Send { receiver, message, .. } => {
            handle_send(identity, receiver, message, state).await;
            Ok(())
        }
        ClientFrame::GetHistory { partner } => handle_get_history(identity, partner, handle, state).await,
        ClientFrame::Register { .. } => {
            debug!("Ignoring repeated register from {}", identity);
            Ok(())
        }
        ClientFrame::Unknown => {
            debug!("Ignoring unknown action from {}", identity);
            Ok(())
        }
    }
}

/// Store the message, then push it to the receiver if online.
///
/// Runs inside the sender's task and finishes the push before the next frame
/// is read, so one sender's messages reach the receiver in order. A full
/// receiver buffer holds the sender here until there is room.
async fn handle_send(sender: &Identity, receiver: Identity, body: String, state: &ServerState) {
    let key = match ConversationKey::new(sender.clone(), receiver.clone()) {
        Ok(key) => key,
        Err(e) => {
            warn!("Dropping send from {}: {}", sender, e);
            return;
        }
    };

    let message = Message::new(sender.clone(), body);
    state.store.append(key, message.clone());

    match state.registry.deliver(&receiver, ServerEvent::NewMessage { message }).await {
        Delivery::Pushed => debug!("{} -> {}: delivered", sender, receiver),
        Delivery::Offline => debug!("{} -> {}: receiver offline, stored for replay", sender, receiver),
        Delivery::Closed => debug!("{} -> {}: receiver closing, stored for replay", sender, receiver),
    }
}

/// Answer `get_history` with the stored conversation, if there is one
async fn handle_get_history(
    identity: &Identity,
    partner: Identity,
    handle: &ConnectionHandle,
    state: &ServerState,
) -> anyhow::Result<()> {
    let Ok(key) = ConversationKey::new(identity.clone(), partner.clone()) else {
        debug!("Ignoring get_history from {} for itself", identity);
        return Ok(());
    };

    match state.store.conversation(&key) {
        Some(messages) if !messages.is_empty() => {
            handle.send(ServerEvent::InitialMessages { partner, messages }).await
        }
        _ => Ok(()),
    }
}

/// Push one `initial_messages` event per conversation `identity` is part of
async fn replay_history(
    state: &ServerState,
    identity: &Identity,
    handle: &ConnectionHandle,
) -> anyhow::Result<usize> {
    let history = state.store.history_for(identity);
    let count = history.len();
    for (partner, messages) in history {
        handle.send(ServerEvent::InitialMessages { partner, messages }).await?;
    }
    Ok(count)
}
