//! The two hand-off queues between the presentation thread and a session
//!
//! Both are plain `flume` channels: the presentation side uses the blocking
//! or non-blocking half, the session worker the async half. Neither side ever
//! touches the connection of the other.

use std::time::Duration;

use tandem_shared::{ClientFrame, ServerEvent};

/// Commands waiting to go to the relay. Outlives individual sessions, so
/// anything not yet picked up survives a reconnect.
#[derive(Debug, Clone)]
pub struct OutgoingQueue {
    tx: flume::Sender<ClientFrame>,
    rx: flume::Receiver<ClientFrame>,
}

impl Default for OutgoingQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OutgoingQueue {
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self { tx, rx }
    }

    /// Enqueue a command for transmission
    pub fn push(&self, frame: ClientFrame) {
        // Cannot fail: this struct keeps a receiver alive.
        let _ = self.tx.send(frame);
    }

    /// Commands not yet picked up by a session
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub(crate) fn receiver(&self) -> flume::Receiver<ClientFrame> {
        self.rx.clone()
    }
}

/// Events received from the relay, drained by the presentation layer.
/// One per session.
#[derive(Debug, Clone)]
pub struct IncomingQueue {
    rx: flume::Receiver<ServerEvent>,
}

impl IncomingQueue {
    pub(crate) fn channel() -> (flume::Sender<ServerEvent>, Self) {
        let (tx, rx) = flume::unbounded();
        (tx, Self { rx })
    }

    /// Next event if one is waiting
    pub fn try_next(&self) -> Option<ServerEvent> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `wait` for the next event
    pub fn next_timeout(&self, wait: Duration) -> Option<ServerEvent> {
        self.rx.recv_timeout(wait).ok()
    }

    /// Everything currently waiting, oldest first
    pub fn drain(&self) -> Vec<ServerEvent> {
        self.rx.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
