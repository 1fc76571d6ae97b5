//! Relay configuration tests
//!
//! Uses `ServerConfig::from_lookup` so nothing touches the process environment.

use std::collections::HashMap;
use std::time::Duration;

use tandem_server::ServerConfig;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_config_defaults() {
    let config = ServerConfig::from_lookup(lookup_from(&[])).unwrap();

    assert_eq!(config.host, "0.0.0.0");
    assert_eq!(config.port, 8765);
    assert_eq!(config.bind_addr(), "0.0.0.0:8765");
    assert_eq!(config.register_timeout(), Duration::from_secs(10));
    assert_eq!(config.outbound_buffer, 256);
    assert!(config.cors_origins.is_none());
}

#[test]
fn test_config_overrides() {
    let config = ServerConfig::from_lookup(lookup_from(&[
        ("TANDEM_RELAY_HOST", "127.0.0.1"),
        ("TANDEM_RELAY_PORT", " 9000 "),
        ("TANDEM_RELAY_MAX_CONNECTIONS", "0"),
        ("TANDEM_RELAY_REGISTER_TIMEOUT", "3"),
        ("TANDEM_RELAY_CORS_ORIGINS", "http://localhost:3000"),
    ]))
    .unwrap();

    assert_eq!(config.bind_addr(), "127.0.0.1:9000");
    assert_eq!(config.max_connections, 0);
    assert_eq!(config.register_timeout(), Duration::from_secs(3));
    assert_eq!(config.cors_origins.as_deref(), Some("http://localhost:3000"));
}

#[test]
fn test_config_invalid_port() {
    let err = ServerConfig::from_lookup(lookup_from(&[("TANDEM_RELAY_PORT", "not_a_port")])).unwrap_err();
    assert!(err.to_string().contains("TANDEM_RELAY_PORT"));

    assert!(ServerConfig::from_lookup(lookup_from(&[("TANDEM_RELAY_PORT", "70000")])).is_err());
}

#[test]
fn test_config_rejects_zero_buffer() {
    let result = ServerConfig::from_lookup(lookup_from(&[("TANDEM_RELAY_OUTBOUND_BUFFER", "0")]));
    assert!(result.is_err());
}

#[test]
fn test_blank_cors_is_permissive() {
    let config = ServerConfig::from_lookup(lookup_from(&[("TANDEM_RELAY_CORS_ORIGINS", "  ")])).unwrap();
    assert!(config.cors_origins.is_none());
}
