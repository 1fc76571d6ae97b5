//! Relay configuration

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Relay configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Maximum inbound WebSocket message size in bytes
    pub max_message_size: usize,
    /// WebSocket ping interval in seconds
    pub ws_ping_interval: u64,
    /// Seconds a new connection may take to send its `register` frame
    pub register_timeout_seconds: u64,
    /// Maximum simultaneous WebSocket connections (0 = unlimited)
    pub max_connections: usize,
    /// Capacity of each connection's outbound event buffer
    pub outbound_buffer: usize,
    /// Comma-separated list of allowed CORS origins (empty = permissive)
    pub cors_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8765,
            max_message_size: 64 * 1024,
            ws_ping_interval: 30,
            register_timeout_seconds: 10,
            max_connections: 1000,
            outbound_buffer: 256,
            cors_origins: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables (and `.env`, if present)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Missing keys keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = ServerConfig {
            host: lookup("TANDEM_RELAY_HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "TANDEM_RELAY_PORT", defaults.port)?,
            max_message_size: parse_or(&lookup, "TANDEM_RELAY_MAX_MESSAGE_SIZE", defaults.max_message_size)?,
            ws_ping_interval: parse_or(&lookup, "TANDEM_RELAY_WS_PING_INTERVAL", defaults.ws_ping_interval)?,
            register_timeout_seconds: parse_or(
                &lookup,
                "TANDEM_RELAY_REGISTER_TIMEOUT",
                defaults.register_timeout_seconds,
            )?,
            max_connections: parse_or(&lookup, "TANDEM_RELAY_MAX_CONNECTIONS", defaults.max_connections)?,
            outbound_buffer: parse_or(&lookup, "TANDEM_RELAY_OUTBOUND_BUFFER", defaults.outbound_buffer)?,
            cors_origins: lookup("TANDEM_RELAY_CORS_ORIGINS").filter(|s| !s.trim().is_empty()),
        };

        if config.outbound_buffer == 0 {
            anyhow::bail!("TANDEM_RELAY_OUTBOUND_BUFFER must be at least 1");
        }
        if config.ws_ping_interval == 0 {
            anyhow::bail!("TANDEM_RELAY_WS_PING_INTERVAL must be at least 1 second");
        }

        Ok(config)
    }

    /// `host:port` string to bind
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Registration deadline for new connections
    pub fn register_timeout(&self) -> Duration {
        Duration::from_secs(self.register_timeout_seconds)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("Invalid {}", key)),
        None => Ok(default),
    }
}
