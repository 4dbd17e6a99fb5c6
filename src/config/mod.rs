//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → CLI overrides applied in main
//!     → handed to startup, which splits it per subsystem
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs (or none at all)
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::CodecConfig;
pub use schema::EngineConfig;
pub use schema::ListenerConfig;
pub use schema::ObservabilityConfig;
pub use schema::ProxyConfig;
pub use schema::RouteConfig;
pub use schema::RoutesConfig;
