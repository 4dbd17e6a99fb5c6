//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind, accept)
//!     → acceptor.rs (one client at a time)
//!         read half  → decode → record queue → engine
//!         write half ← writer task ← backend byte queue ← relay
//!     → connection.rs (identity, lifetime logging)
//! ```
//!
//! # Design Decisions
//! - A single inbound client is served at a time
//! - The backend byte queue outlives connections and passes between writers

pub mod acceptor;
pub mod connection;
pub mod listener;
