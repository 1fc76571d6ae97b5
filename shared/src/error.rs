//! Error types for identities and wire frames

use thiserror::Error;

/// Errors raised while building identities or moving frames across the wire
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Username was empty (or only whitespace)
    #[error("Identity must not be empty")]
    EmptyIdentity,

    /// A conversation needs two distinct parties
    #[error("Cannot open a conversation between {0} and itself")]
    SelfConversation(String),

    /// Frame could not be serialized
    #[error("Encode error: {0}")]
    Encode(String),

    /// Frame could not be parsed
    #[error("Malformed frame: {0}")]
    Decode(String),
}

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
