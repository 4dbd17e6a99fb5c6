//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, stderr)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → Terminal / log capture
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields (endpoint, record type, connection id) on every event
//! - Metrics are cheap and inert until a recorder is installed
//! - Operator-facing output is not logging; it goes through the console

pub mod logging;
pub mod metrics;
