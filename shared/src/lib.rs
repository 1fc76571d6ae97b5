//! Tandem shared protocol types
//!
//! Identities, conversation keys, stored messages and the frames exchanged
//! between the relay and its clients.

#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod codec;
pub mod error;
pub mod identity;
pub mod protocol;

pub use codec::{Codec, Frame};
pub use error::ProtocolError;
pub use identity::{ConversationKey, Identity};
pub use protocol::{ClientFrame, DeliveryStatus, Message, ServerEvent};

/// Version of the wire protocol, reported by the relay's `/info` endpoint
pub const PROTOCOL_VERSION: u8 = 1;
