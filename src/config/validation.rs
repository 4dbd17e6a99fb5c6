//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (chunk size, queue capacity, dial attempts)
//! - Check addresses parse and breakpoint bytes are record types
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::codec::RecordType;
use crate::codec::record::MAX_PAYLOAD_LEN;
use crate::config::schema::ProxyConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: '{value}' is not a socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("engine.breakpoints: {0:#04x} is not a record type")]
    UnknownBreakpoint(u8),

    #[error("routes.initial[{index}]: host is empty")]
    EmptyRouteHost { index: usize },
}

/// Check a loaded configuration for semantic errors.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    check_range(
        &mut errors,
        "listener.max_accept_failures",
        u64::from(config.listener.max_accept_failures),
        1,
        u64::from(u32::MAX),
    );
    check_range(
        &mut errors,
        "codec.read_chunk_size",
        config.codec.read_chunk_size as u64,
        1,
        MAX_PAYLOAD_LEN as u64,
    );
    check_range(
        &mut errors,
        "routes.max_dial_attempts",
        u64::from(config.routes.max_dial_attempts),
        1,
        u64::from(u32::MAX),
    );
    check_range(
        &mut errors,
        "engine.queue_capacity",
        config.engine.queue_capacity as u64,
        1,
        1 << 20,
    );

    for &byte in &config.engine.breakpoints {
        if RecordType::try_from(byte).is_err() {
            errors.push(ValidationError::UnknownBreakpoint(byte));
        }
    }

    for (index, route) in config.routes.initial.iter().enumerate() {
        if route.host.trim().is_empty() {
            errors.push(ValidationError::EmptyRouteHost { index });
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_range(errors: &mut Vec<ValidationError>, field: &'static str, value: u64, min: u64, max: u64) {
    if value < min || value > max {
        errors.push(ValidationError::OutOfRange { field, value, min, max });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RouteConfig;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.codec.read_chunk_size = 0;
        config.engine.breakpoints = vec![0x17, 0x30];
        config.routes.initial.push(RouteConfig {
            host: " ".into(),
            port: 9000,
        });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::UnknownBreakpoint(0x30)));
        assert!(errors.contains(&ValidationError::EmptyRouteHost { index: 0 }));
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = ProxyConfig::default();
        config.observability.metrics_address = "nope".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
