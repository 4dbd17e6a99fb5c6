//! Record codec subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound bytes (client socket or backend route)
//!     → decoder.rs (5-byte header, exact-read payload loop)
//!     → Record (validated type, payload.len() == length)
//!
//! Record
//!     → record.rs encode (length recomputed from payload)
//!     → bytes written to a route or the client socket
//! ```
//!
//! # Design Decisions
//! - Reads are bounded (chunk size) and short reads are retried, never failed
//! - A bad type byte is a protocol violation: the caller closes the connection
//! - Oversized declared lengths are logged, not rejected
//! - Encoding never trusts the stored length field

pub mod decoder;
pub mod record;

pub use decoder::{ChunkSource, CodecError, PartialRecord, RecordDecoder};
pub use record::{PayloadTooLarge, Record, RecordType, HEADER_LEN};
