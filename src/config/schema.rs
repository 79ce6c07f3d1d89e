//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, web root, connection limit).
    pub listener: ListenerConfig,

    /// Proxy cache settings.
    pub cache: CacheConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Size limits for requests and origin responses.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind (e.g., "127.0.0.1").
    pub host: String,

    /// TCP port to bind. `0` picks an ephemeral port.
    pub port: u16,

    /// Directory local targets are served from.
    pub web_root: PathBuf,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl ListenerConfig {
    /// The `host:port` pair as a string, suitable for parsing or display.
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.bind_address().parse()
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            web_root: PathBuf::from("."),
            max_connections: 1024,
        }
    }
}

/// Proxy cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Seconds a cached response is served without revalidation.
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 30 }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Origin connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Longest wait for the next chunk from an origin, in seconds.
    pub origin_read_secs: u64,

    /// Longest wait for the next chunk of a client request, in seconds.
    pub client_read_secs: u64,

    /// Time allowed to write a response to the client, in seconds.
    pub client_write_secs: u64,

    /// How long shutdown waits for in-flight connections, in seconds.
    pub shutdown_grace_secs: u64,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn origin_read(&self) -> Duration {
        Duration::from_secs(self.origin_read_secs)
    }

    pub fn client_read(&self) -> Duration {
        Duration::from_secs(self.client_read_secs)
    }

    pub fn client_write(&self) -> Duration {
        Duration::from_secs(self.client_write_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            origin_read_secs: 30,
            client_read_secs: 10,
            client_write_secs: 10,
            shutdown_grace_secs: 5,
        }
    }
}

/// Size limits.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest request (head and body) read from a client, in bytes.
    pub max_request_bytes: usize,

    /// Largest response accepted from an origin, in bytes.
    pub max_response_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_bytes: 64 * 1024,
            max_response_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_configuration() {
        let config = ProxyConfig::default();
        assert_eq!(config.listener.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.listener.web_root, PathBuf::from("."));
        assert_eq!(config.cache.ttl(), Duration::from_secs(30));
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [listener]
            port = 9000
            web_root = "/srv/www"

            [cache]
            ttl_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.listener.port, 9000);
        assert_eq!(config.listener.host, "127.0.0.1");
        assert_eq!(config.listener.web_root, PathBuf::from("/srv/www"));
        assert_eq!(config.cache.ttl_secs, 5);
        assert_eq!(config.timeouts, TimeoutConfig::default());
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        let listener = ListenerConfig {
            host: "::1".into(),
            port: 80,
            ..ListenerConfig::default()
        };
        assert_eq!(listener.bind_address(), "[::1]:80");
        assert!(listener.socket_addr().is_ok());
    }
}
