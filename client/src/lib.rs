//! Tandem chat client
//!
//! A [`ClientSession`] owns one connection to the relay on a background
//! thread; the presentation layer only ever touches its two queues.
//! [`SessionSupervisor`] recreates the session when it dies, and
//! [`ChatState`] keeps the local conversation cache.

pub mod chat;
pub mod config;
pub mod credentials;
pub mod error;
pub mod queue;
pub mod session;
pub mod supervisor;

pub use chat::{ChatState, ChatUpdate};
pub use config::ClientConfig;
pub use credentials::CredentialStore;
pub use error::{ClientError, Result};
pub use queue::{IncomingQueue, OutgoingQueue};
pub use session::ClientSession;
pub use supervisor::{Backoff, SessionSupervisor};
