//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → Engine + configured routes → Relay → Listener + Acceptor
//!
//! Shutdown (shutdown.rs):
//!     Engine exits → Trigger → Acceptor and relay stop
//!
//! Signals (signals.rs):
//!     SIGINT / Ctrl-C → Interrupt event → Engine pauses
//! ```
//!
//! # Design Decisions
//! - Ordered startup: routes first, listener last
//! - Ctrl-C pauses the engine instead of terminating; `q` is the way out

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownListener};
pub use signals::spawn_interrupt_listener;
pub use startup::{start, Startup, StartupError};
