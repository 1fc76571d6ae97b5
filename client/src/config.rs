//! Client configuration

use std::env;
use std::time::Duration;

use tandem_shared::Codec;

use crate::error::{ClientError, Result};

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay address; scheme and `/ws` path are filled in when missing
    pub relay_url: String,
    /// Encoding for outgoing frames
    pub codec: Codec,
    /// Longest the outgoing loop waits on an empty queue before re-checking
    /// cancellation. Lower means snappier sends and more idle wakeups.
    pub outgoing_poll: Duration,
    /// Longest the incoming loop waits for a frame before re-checking
    /// cancellation
    pub incoming_poll: Duration,
    /// Limit on connecting plus the WebSocket handshake
    pub connect_timeout: Duration,
    /// First delay after a failed session start
    pub backoff_base: Duration,
    /// Upper bound for the delay between session starts
    pub backoff_max: Duration,
    /// How long a session must stay up before the backoff resets. A session
    /// that dies sooner counts as a failed start.
    pub stable_after: Duration,
    /// Credential allow-list override, `user:pass,user:pass`
    pub users: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://localhost:8765/ws".to_string(),
            codec: Codec::Json,
            outgoing_poll: Duration::from_millis(100),
            incoming_poll: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(5),
            backoff_base: Duration::from_millis(250),
            backoff_max: Duration::from_secs(10),
            stable_after: Duration::from_secs(5),
            users: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables (and `.env`, if present)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| -> Result<Duration> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|_| ClientError::Config(format!("Invalid {}", key))),
                None => Ok(default),
            }
        };

        let config = ClientConfig {
            relay_url: lookup("TANDEM_CLIENT_RELAY_URL").unwrap_or(defaults.relay_url),
            codec: match lookup("TANDEM_CLIENT_CODEC") {
                Some(raw) => raw
                    .parse()
                    .map_err(|_| ClientError::Config(format!("Invalid TANDEM_CLIENT_CODEC: {}", raw)))?,
                None => defaults.codec,
            },
            outgoing_poll: millis("TANDEM_CLIENT_OUTGOING_POLL_MS", defaults.outgoing_poll)?,
            incoming_poll: millis("TANDEM_CLIENT_INCOMING_POLL_MS", defaults.incoming_poll)?,
            connect_timeout: millis("TANDEM_CLIENT_CONNECT_TIMEOUT_MS", defaults.connect_timeout)?,
            backoff_base: millis("TANDEM_CLIENT_BACKOFF_BASE_MS", defaults.backoff_base)?,
            backoff_max: millis("TANDEM_CLIENT_BACKOFF_MAX_MS", defaults.backoff_max)?,
            stable_after: millis("TANDEM_CLIENT_STABLE_AFTER_MS", defaults.stable_after)?,
            users: lookup("TANDEM_CLIENT_USERS").filter(|s| !s.trim().is_empty()),
        };

        if config.outgoing_poll.is_zero() || config.incoming_poll.is_zero() {
            return Err(ClientError::Config("poll intervals must be non-zero".to_string()));
        }
        Ok(config)
    }

    /// Relay URL with a WebSocket scheme and the `/ws` endpoint
    pub fn ws_url(&self) -> String {
        let url = self.relay_url.trim().trim_end_matches('/');
        let ws_url = if url.starts_with("wss://") || url.starts_with("ws://") {
            url.to_string()
        } else if let Some(rest) = url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            format!("ws://{}", url)
        };

        if ws_url.ends_with("/ws") {
            ws_url
        } else {
            format!("{}/ws", ws_url)
        }
    }
}
