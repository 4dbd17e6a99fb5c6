//! Interactive record-intercepting proxy library

pub mod codec;
pub mod config;
pub mod intercept;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use codec::{Record, RecordType};
pub use config::schema::ProxyConfig;
pub use intercept::{EngineExit, InterceptionEngine, Operator};
pub use lifecycle::Shutdown;
