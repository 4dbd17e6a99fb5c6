//! Interception subsystem.
//!
//! # Data Flow
//! ```text
//! record queue ──┐
//!                ├→ engine.rs ── breakpoint? ──no──→ default route (auto-forward)
//! interrupts ────┘                  │
//!                                  yes
//!                                   ↓
//!                     pause: operator.rs line → command.rs parse → execute
//!                                   ↓
//!                     forward / drop / continue / quit
//! ```
//!
//! # Design Decisions
//! - One task owns all interception state
//! - Interrupts pause without a current record
//! - The breakpoint set starts from configuration and is toggled live

pub mod breakpoints;
pub mod command;
pub mod engine;
pub mod operator;

pub use breakpoints::BreakpointSet;
pub use command::{Command, CommandError, RouteTarget, HELP};
pub use engine::{EngineExit, InterceptionEngine};
pub use operator::{Operator, OperatorHandle};
