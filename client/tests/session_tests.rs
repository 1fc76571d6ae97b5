//! Client session tests against a real relay
//!
//! The relay runs on its own runtime thread; the tests themselves are plain
//! synchronous code, like the presentation layer that drives a session.

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tandem_client::{ChatState, ClientConfig, ClientError, ClientSession, OutgoingQueue, SessionSupervisor};
use tandem_server::{ServerConfig, ServerState};
use tandem_shared::{ClientFrame, Codec, ConversationKey, Identity, ServerEvent};

const EVENT_WAIT: Duration = Duration::from_secs(3);

// ============================================================================
// Helpers
// ============================================================================

struct Relay {
    addr: SocketAddr,
    state: Arc<ServerState>,
    stop: Option<tokio::sync::oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Relay {
    fn start() -> Self {
        Self::start_on("127.0.0.1:0".parse().unwrap())
    }

    /// Bind `addr` and serve until stopped. Dropping the runtime on stop
    /// tears down every open connection, which is what a crashed relay
    /// looks like to a client.
    fn start_on(addr: SocketAddr) -> Self {
        let listener = TcpListener::bind(addr).expect("bind relay");
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ServerState::new(ServerConfig::default()));
        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();

        let serve_state = state.clone();
        let thread = thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                tokio::spawn(tandem_server::serve(listener, serve_state, std::future::pending()));
                let _ = stopped.await;
            });
            runtime.shutdown_timeout(Duration::from_secs(1));
        });

        Self {
            addr,
            state,
            stop: Some(stop),
            thread: Some(thread),
        }
    }

    fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            thread.join().unwrap();
        }
    }

    fn is_online(&self, name: &str) -> bool {
        self.state.registry.lookup(&id(name)).is_some()
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.stop();
    }
}

fn id(s: &str) -> Identity {
    Identity::new(s).unwrap()
}

fn key(a: &str, b: &str) -> ConversationKey {
    ConversationKey::new(id(a), id(b)).unwrap()
}

fn config_for(url: String) -> ClientConfig {
    ClientConfig {
        relay_url: url,
        incoming_poll: Duration::from_millis(200),
        connect_timeout: Duration::from_secs(2),
        backoff_base: Duration::from_millis(20),
        backoff_max: Duration::from_millis(200),
        ..ClientConfig::default()
    }
}

fn free_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

fn wait_until<F: FnMut() -> bool>(what: &str, mut condition: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(10));
    }
}

/// Start a session and wait until the relay has registered it
fn online_session(relay: &Relay, config: &ClientConfig, name: &str) -> ClientSession {
    let session = ClientSession::start(config, id(name), OutgoingQueue::new()).expect("session starts");
    wait_until("registration", || relay.is_online(name));
    session
}

fn send(session: &ClientSession, to: &str, text: &str) {
    session.outgoing().push(ClientFrame::Send {
        sender: Some(session.identity().clone()),
        receiver: id(to),
        message: text.to_string(),
    });
}

// ============================================================================
// Session
// ============================================================================

#[test]
fn test_live_message_between_sessions() {
    let relay = Relay::start();
    let config = config_for(relay.url());
    let alice = online_session(&relay, &config, "user1");
    let bob = online_session(&relay, &config, "user2");

    send(&alice, "user2", "yo");

    match bob.incoming().next_timeout(EVENT_WAIT) {
        Some(ServerEvent::NewMessage { message }) => {
            assert_eq!(message.sender, id("user1"));
            assert_eq!(message.body, "yo");
        }
        other => panic!("expected new_message, got {:?}", other),
    }
    assert!(alice.incoming().next_timeout(Duration::from_millis(300)).is_none());
}

#[test]
fn test_offline_message_replayed_on_start() {
    let relay = Relay::start();
    let config = config_for(relay.url());
    let alice = online_session(&relay, &config, "user1");

    send(&alice, "user2", "hi");
    wait_until("message stored", || relay.state.store.conversation(&key("user1", "user2")).is_some());

    let bob = online_session(&relay, &config, "USER2");
    match bob.incoming().next_timeout(EVENT_WAIT) {
        Some(ServerEvent::InitialMessages { partner, messages }) => {
            assert_eq!(partner, id("user1"));
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].body, "hi");
            assert_eq!(messages[0].sender, id("user1"));
        }
        other => panic!("expected initial_messages, got {:?}", other),
    }
}

#[test]
fn test_messagepack_sessions() {
    let relay = Relay::start();
    let config = ClientConfig {
        codec: Codec::MessagePack,
        ..config_for(relay.url())
    };
    let alice = online_session(&relay, &config, "user1");
    let bob = online_session(&relay, &config, "user2");

    send(&alice, "user2", "packed");

    match bob.incoming().next_timeout(EVENT_WAIT) {
        Some(ServerEvent::NewMessage { message }) => assert_eq!(message.body, "packed"),
        other => panic!("expected new_message, got {:?}", other),
    }
}

#[test]
fn test_start_fails_when_relay_unreachable() {
    let config = config_for(format!("ws://{}/ws", free_addr()));
    let result = ClientSession::start(&config, id("user1"), OutgoingQueue::new());
    assert!(matches!(result, Err(ClientError::Connect { .. })));
}

#[test]
fn test_stop_is_prompt() {
    let relay = Relay::start();
    let config = ClientConfig {
        incoming_poll: Duration::from_secs(5),
        ..config_for(relay.url())
    };
    let mut session = online_session(&relay, &config, "user1");
    assert!(session.is_running());

    let started = Instant::now();
    session.stop();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!session.is_running());
    wait_until("relay unregisters", || !relay.is_online("user1"));
}

#[test]
fn test_session_notices_relay_loss() {
    let mut relay = Relay::start();
    let config = config_for(relay.url());
    let session = online_session(&relay, &config, "user1");

    relay.stop();
    wait_until("session to stop", || !session.is_running());
}

// ============================================================================
// Supervisor
// ============================================================================

#[test]
fn test_supervisor_connects_once_relay_appears() {
    let addr = free_addr();
    let mut supervisor = SessionSupervisor::new(config_for(format!("ws://{}/ws", addr)), id("user1"));
    assert!(supervisor.ensure_running().is_none());

    let relay = Relay::start_on(addr);
    wait_until("supervisor to connect", || supervisor.ensure_running().is_some());
    wait_until("registration", || relay.is_online("user1"));
    assert!(supervisor.is_connected());
}

#[test]
fn test_supervisor_replaces_dead_session_and_sends_queued_commands() {
    let mut relay = Relay::start();
    let addr = relay.addr;
    let mut supervisor = SessionSupervisor::new(config_for(relay.url()), id("user1"));
    wait_until("supervisor to connect", || supervisor.ensure_running().is_some());

    relay.stop();
    wait_until("supervisor to notice", || supervisor.ensure_running().is_none());

    // Queued while disconnected; the next session picks it up.
    supervisor.outgoing().push(ClientFrame::Send {
        sender: None,
        receiver: id("user2"),
        message: "while you were out".to_string(),
    });

    let relay = Relay::start_on(addr);
    wait_until("supervisor to reconnect", || supervisor.ensure_running().is_some());
    wait_until("queued message stored", || {
        relay
            .state
            .store
            .conversation(&key("user1", "user2"))
            .is_some_and(|messages| messages[0].body == "while you were out")
    });
    assert!(supervisor.outgoing().is_empty());
}

/// Accepts WebSocket connections and drops each one right after the first
/// frame. Returns the address and a counter of accepted connections.
fn start_flapping_relay() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));

    let counter = accepted.clone();
    thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async move {
            use futures::StreamExt;
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                        let _ = ws.next().await;
                    }
                });
            }
        });
    });
    (addr, accepted)
}

#[test]
fn test_supervisor_backs_off_when_sessions_die_at_once() {
    let (addr, accepted) = start_flapping_relay();
    let config = ClientConfig {
        backoff_base: Duration::from_millis(200),
        backoff_max: Duration::from_secs(1),
        stable_after: Duration::from_secs(5),
        ..config_for(format!("ws://{}/ws", addr))
    };
    let mut supervisor = SessionSupervisor::new(config, id("user1"));

    let until = Instant::now() + Duration::from_millis(1500);
    while Instant::now() < until {
        supervisor.ensure_running();
        thread::sleep(Duration::from_millis(10));
    }
    supervisor.shutdown();

    // 0, +200, +400, +800 ms: a handful of attempts, not one per tick
    let attempts = accepted.load(Ordering::SeqCst);
    assert!(attempts >= 2, "supervisor retried {} times", attempts);
    assert!(attempts <= 5, "supervisor retried {} times", attempts);
}

#[test]
fn test_chat_state_over_supervisor() {
    let relay = Relay::start();
    let config = config_for(relay.url());
    let alice = online_session(&relay, &config, "user1");
    send(&alice, "user2", "one");
    wait_until("message stored", || relay.state.store.conversation(&key("user1", "user2")).is_some());

    let mut supervisor = SessionSupervisor::new(config, id("user2"));
    let mut chat = ChatState::new(id("user2"), supervisor.outgoing().clone());
    wait_until("supervisor to connect", || supervisor.ensure_running().is_some());

    // Replay on registration plus the get_history answer.
    chat.select_partner(id("user1")).unwrap();
    let mut replays = 0;
    wait_until("two history events", || {
        for event in supervisor.drain_incoming() {
            if matches!(event, ServerEvent::InitialMessages { .. }) {
                replays += 1;
            }
            chat.apply(event);
        }
        replays >= 2
    });
    let bodies: Vec<&str> = chat.conversation_with(&id("user1")).iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, vec!["one"]);

    chat.compose("two").unwrap();
    match alice.incoming().next_timeout(EVENT_WAIT) {
        Some(ServerEvent::NewMessage { message }) => {
            assert_eq!(message.sender, id("user2"));
            assert_eq!(message.body, "two");
        }
        other => panic!("expected new_message, got {:?}", other),
    }
    assert_eq!(chat.conversation_with(&id("user1")).len(), 2);
}
