//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the interceptor.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the interceptor.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Inbound listener settings.
    pub listener: ListenerConfig,

    /// Record framing settings.
    pub codec: CodecConfig,

    /// Outbound route settings.
    pub routes: RoutesConfig,

    /// Interception engine settings.
    pub engine: EngineConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:1589").
    pub bind_address: String,

    /// Consecutive accept failures tolerated before the acceptor gives up.
    pub max_accept_failures: u32,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:1589".to_string(),
            max_accept_failures: 5,
        }
    }
}

/// Record framing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Upper bound on bytes requested per read.
    pub read_chunk_size: usize,

    /// Declared lengths above this are logged as large records.
    pub large_record_threshold: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: 512,
            large_record_threshold: 1000,
        }
    }
}

/// Outbound route configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutesConfig {
    /// Dial attempts per connect cycle before a route is marked failed.
    pub max_dial_attempts: u32,

    /// Routes added at startup. The first one becomes the default.
    pub initial: Vec<RouteConfig>,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            max_dial_attempts: 5,
            initial: Vec::new(),
        }
    }
}

/// A backend route given in the config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Hostname or IPv4 address.
    pub host: String,

    /// Backend port.
    pub port: u16,
}

/// Interception engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of the record queue and the backend byte queue.
    pub queue_capacity: usize,

    /// Record type bytes that pause the engine at startup.
    pub breakpoints: Vec<u8>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            breakpoints: vec![0x17],
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
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
    fn defaults_match_wire_tool() {
        let config = ProxyConfig::default();
        assert_eq!(config.listener.bind_address, "0.0.0.0:1589");
        assert_eq!(config.listener.max_accept_failures, 5);
        assert_eq!(config.codec.read_chunk_size, 512);
        assert_eq!(config.routes.max_dial_attempts, 5);
        assert_eq!(config.engine.queue_capacity, 1024);
        assert_eq!(config.engine.breakpoints, vec![0x17]);
        assert!(config.routes.initial.is_empty());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:4433"

            [engine]
            breakpoints = [22, 23]

            [[routes.initial]]
            host = "127.0.0.1"
            port = 9000
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:4433");
        assert_eq!(config.listener.max_accept_failures, 5);
        assert_eq!(config.engine.breakpoints, vec![22, 23]);
        assert_eq!(config.engine.queue_capacity, 1024);
        assert_eq!(config.routes.initial.len(), 1);
        assert_eq!(config.routes.initial[0].port, 9000);
        assert_eq!(config.routes.max_dial_attempts, 5);
    }
}
