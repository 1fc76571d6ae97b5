//! Wire frames
//!
//! Every frame is a map tagged by its `action` field:
//!
//! | direction      | action             | fields                              |
//! |----------------|--------------------|-------------------------------------|
//! | client → relay | `register`         | `username`                          |
//! | client → relay | `send`             | `sender`, `receiver`, `message`     |
//! | client → relay | `get_history`      | `partner`                           |
//! | relay → client | `initial_messages` | `partner`, `messages[]`             |
//! | relay → client | `new_message`      | `message{sender, message, timestamp, status}` |
//!
//! Actions this version does not know decode to an `Unknown` variant so that
//! newer peers can add actions without breaking older ones.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// Delivery state of a stored message. Delivery is best-effort, so every
/// accepted message is `Delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Accepted by the relay
    #[default]
    Delivered,
}

/// One chat message. Immutable once the relay has accepted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Author of the message
    pub sender: Identity,
    /// Message text
    #[serde(rename = "message")]
    pub body: String,
    /// Unix time in (fractional) seconds
    #[serde(rename = "timestamp")]
    pub sent_at: f64,
    /// Delivery state
    #[serde(default)]
    pub status: DeliveryStatus,
}

impl Message {
    /// Create a message stamped with the current time
    pub fn new(sender: Identity, body: impl Into<String>) -> Self {
        Self {
            sender,
            body: body.into(),
            sent_at: unix_seconds_now(),
            status: DeliveryStatus::Delivered,
        }
    }
}

/// Current Unix time as fractional seconds
pub fn unix_seconds_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Frames a client sends to the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Bind the connection to an identity; must be the first frame
    Register {
        /// Username to register under
        username: Identity,
    },
    /// Store a message and push it to the receiver if online
    Send {
        /// Informational only; the relay uses the registered identity
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<Identity>,
        /// Addressee
        receiver: Identity,
        /// Message text
        message: String,
    },
    /// Ask for the stored conversation with `partner`
    GetHistory {
        /// The other party of the conversation
        partner: Identity,
    },
    /// Any action this version does not know about
    #[serde(other)]
    Unknown,
}

impl ClientFrame {
    /// The `action` tag of this frame, for logging
    pub fn action(&self) -> &'static str {
        match self {
            ClientFrame::Register { .. } => "register",
            ClientFrame::Send { .. } => "send",
            ClientFrame::GetHistory { .. } => "get_history",
            ClientFrame::Unknown => "unknown",
        }
    }
}

/// Events the relay pushes to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Full stored conversation with one partner
    InitialMessages {
        /// The other party of the conversation
        partner: Identity,
        /// Every stored message, oldest first
        messages: Vec<Message>,
    },
    /// Live push of a message addressed to this client
    NewMessage {
        /// The stored message
        message: Message,
    },
    /// Any event this version does not know about
    #[serde(other)]
    Unknown,
}
