//! Client error types

use tandem_shared::ProtocolError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors surfaced by the client library
#[derive(Error, Debug)]
pub enum ClientError {
    /// The relay could not be reached or refused the WebSocket upgrade
    #[error("Connection to {url} failed: {source}")]
    Connect {
        url: String,
        #[source]
        source: Box<tungstenite::Error>,
    },

    /// The relay did not answer within the connect timeout
    #[error("Connection to {0} timed out")]
    ConnectTimeout(String),

    /// Sending or receiving on an established connection failed
    #[error("Transport error: {0}")]
    Transport(#[from] Box<tungstenite::Error>),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The session worker thread or its runtime could not be started
    #[error("Failed to start session worker: {0}")]
    Runtime(#[from] std::io::Error),

    /// The session worker went away before reporting its connection state
    #[error("Session worker exited before connecting")]
    WorkerExited,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("No conversation partner selected")]
    NoPartnerSelected,

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<tungstenite::Error> for ClientError {
    fn from(err: tungstenite::Error) -> Self {
        ClientError::Transport(Box::new(err))
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
