//! One relay session: a worker thread with its own runtime and connection
//!
//! The worker runs two loops over the split socket. The outgoing loop drains
//! the shared [`OutgoingQueue`] into the socket; the incoming loop decodes
//! relay events into this session's [`IncomingQueue`]. Either loop ending
//! cancels the other, so the session is either fully up or winding down.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tandem_shared::{ClientFrame, Codec, Frame, Identity, ServerEvent};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::queue::{IncomingQueue, OutgoingQueue};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on sending the close frame while shutting down
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// A running connection to the relay on behalf of one identity
pub struct ClientSession {
    identity: Identity,
    incoming: IncomingQueue,
    outgoing: OutgoingQueue,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl ClientSession {
    /// Connect and register, returning once the registration frame is on
    /// the wire. Fails if the relay is unreachable or the worker cannot start.
    pub fn start(config: &ClientConfig, identity: Identity, outgoing: OutgoingQueue) -> Result<Self> {
        let (events_tx, incoming) = IncomingQueue::channel();
        let (ready_tx, ready_rx) = flume::bounded::<Result<()>>(1);
        let cancel = CancellationToken::new();

        let worker = {
            let config = config.clone();
            let identity = identity.clone();
            let commands = outgoing.receiver();
            let cancel = cancel.clone();
            thread::Builder::new()
                .name(format!("tandem-session-{}", identity))
                .spawn(move || {
                    let runtime = match tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                    {
                        Ok(runtime) => runtime,
                        Err(e) => {
                            let _ = ready_tx.send(Err(ClientError::Runtime(e)));
                            return;
                        }
                    };
                    runtime.block_on(run_session(config, identity, commands, events_tx, cancel, ready_tx));
                })?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                identity,
                incoming,
                outgoing,
                cancel,
                worker: Some(worker),
            }),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(ClientError::WorkerExited)
            }
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Events received by this session
    pub fn incoming(&self) -> &IncomingQueue {
        &self.incoming
    }

    /// The queue this session drains
    pub fn outgoing(&self) -> &OutgoingQueue {
        &self.outgoing
    }

    /// True while both loops are still running
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
            && self.worker.as_ref().is_some_and(|worker| !worker.is_finished())
    }

    /// Cancel both loops and wait for the worker thread to exit
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Session worker for {} panicked", self.identity);
            }
        }
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_session(
    config: ClientConfig,
    identity: Identity,
    commands: flume::Receiver<ClientFrame>,
    events: flume::Sender<ServerEvent>,
    cancel: CancellationToken,
    ready: flume::Sender<Result<()>>,
) {
    let ws_stream = match connect(&config, &identity).await {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    info!("Session for {} connected to {}", identity, config.ws_url());
    let _ = ready.send(Ok(()));

    let (write, read) = ws_stream.split();
    tokio::join!(
        outgoing_loop(write, commands, config.codec, config.outgoing_poll, cancel.clone()),
        incoming_loop(read, events, config.incoming_poll, cancel),
    );
    info!("Session for {} ended", identity);
}

/// Open the socket and send the registration frame
async fn connect(config: &ClientConfig, identity: &Identity) -> Result<WsStream> {
    let url = config.ws_url();
    debug!("Connecting to {}", url);

    let (mut ws_stream, _) = match timeout(config.connect_timeout, connect_async(url.as_str())).await {
        Ok(Ok(pair)) => pair,
        Ok(Err(e)) => {
            return Err(ClientError::Connect {
                url,
                source: Box::new(e),
            })
        }
        Err(_) => return Err(ClientError::ConnectTimeout(url)),
    };

    let register = ClientFrame::Register {
        username: identity.clone(),
    };
    ws_stream.send(into_ws(config.codec.encode(&register)?)).await?;
    Ok(ws_stream)
}

async fn outgoing_loop(
    mut write: SplitSink<WsStream, WsMessage>,
    commands: flume::Receiver<ClientFrame>,
    codec: Codec,
    poll: Duration,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            next = timeout(poll, commands.recv_async()) => match next {
                Ok(Ok(frame)) => frame,
                Ok(Err(_)) => break,
                Err(_) => continue,
            },
        };

        let encoded = match codec.encode(&frame) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("Dropping unencodable {} frame: {}", frame.action(), e);
                continue;
            }
        };
        if let Err(e) = write.send(into_ws(encoded)).await {
            warn!("Failed to send {} frame: {}", frame.action(), e);
            break;
        }
        debug!("Sent {} frame", frame.action());
    }

    cancel.cancel();
    let _ = timeout(CLOSE_TIMEOUT, write.close()).await;
}

async fn incoming_loop(
    mut read: SplitStream<WsStream>,
    events: flume::Sender<ServerEvent>,
    poll: Duration,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = timeout(poll, read.next()) => next,
        };

        let frame = match next {
            Err(_) => continue,
            Ok(None) => {
                info!("Relay closed the connection");
                break;
            }
            Ok(Some(Err(e))) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
            Ok(Some(Ok(WsMessage::Text(text)))) => Frame::Text(text),
            Ok(Some(Ok(WsMessage::Binary(data)))) => Frame::Binary(data),
            Ok(Some(Ok(WsMessage::Close(_)))) => {
                info!("Relay sent close");
                break;
            }
            Ok(Some(Ok(_))) => continue,
        };

        match frame.decode::<ServerEvent>() {
            Ok(event) => {
                if events.send(event).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("Malformed frame from relay: {}", e);
                break;
            }
        }
    }

    cancel.cancel();
}

fn into_ws(frame: Frame) -> WsMessage {
    match frame {
        Frame::Text(text) => WsMessage::Text(text),
        Frame::Binary(data) => WsMessage::Binary(data),
    }
}
