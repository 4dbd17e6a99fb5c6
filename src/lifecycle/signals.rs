//! OS signal handling.
//!
//! # Responsibilities
//! - Register the SIGINT / Ctrl-C handler
//! - Translate each delivery into an interrupt event for the engine
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - The handler is re-armed after every delivery
//! - Interrupts coalesce: at most one is queued while the engine is paused

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Spawn the interrupt listener. Each Ctrl-C yields one `()` on the receiver.
pub fn spawn_interrupt_listener() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for interrupts");
                break;
            }

            match tx.try_send(()) {
                Ok(()) => tracing::debug!("Interrupt received"),
                Err(TrySendError::Full(())) => tracing::debug!("Interrupt already pending"),
                Err(TrySendError::Closed(())) => break,
            }
        }
    });

    rx
}
