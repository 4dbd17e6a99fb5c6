//! Outbound routing subsystem.
//!
//! # Data Flow
//! ```text
//! Operator command (a / r / s)
//!     → endpoint.rs (resolve host to IPv4 endpoint)
//!     → table.rs (add / remove / set default)
//!     → route.rs (reliable connection per endpoint)
//!
//! Engine forward:
//!     Record → encode → table default route → route.rs write
//!
//! Backend traffic:
//!     default route → relay.rs (decode) → client byte queue
//! ```
//!
//! # Design Decisions
//! - Routes are keyed by value (IPv4 + port), one route per endpoint
//! - The table is single-owner; the relay learns the default via a watch channel
//! - Reconnects are hidden behind blocking read/write

pub mod endpoint;
pub mod relay;
pub mod route;
pub mod table;

pub use endpoint::{EndPoint, ResolveError};
pub use relay::BackendRelay;
pub use route::{RouteError, RouteHandle, RouteState};
pub use table::RouteTable;
