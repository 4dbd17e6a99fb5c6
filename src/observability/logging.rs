//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Pick the log level from the environment or the config
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Logs go to stderr; stdout belongs to the operator console
//! - `RUST_LOG` overrides the configured level

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter used when `RUST_LOG` is unset.
pub fn default_filter(level: &str) -> String {
    format!("record_interceptor={level}")
}

/// Install the global subscriber. Call once, before any task starts.
pub fn init_logging(level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level).into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
