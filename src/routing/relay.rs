//! Backend → client relay.
//!
//! # Responsibilities
//! - Follow the default route published by the engine
//! - Decode records arriving from it and queue their bytes for the client
//!
//! # Design Decisions
//! - Independent of breakpoints: backend traffic is never paused
//! - Each route keeps its own partial record, so switching the default away
//!   and back never splits a record
//! - A closed or failed route parks the relay until the default changes
//! - A malformed backend record forces a reconnect of that route

use bytes::Bytes;
use tokio::sync::{mpsc, watch};

use crate::codec::{CodecError, PartialRecord, Record, RecordDecoder};
use crate::lifecycle::ShutdownListener;
use crate::observability::metrics;
use crate::routing::route::{RouteHandle, RouteState};

/// Relays records from the current default route into the client byte queue.
pub struct BackendRelay {
    decoder: RecordDecoder,
    default_route: watch::Receiver<Option<RouteHandle>>,
    output: mpsc::Sender<Bytes>,
    partials: Vec<(RouteHandle, PartialRecord)>,
}

enum Event {
    Decoded(Result<Record, CodecError>),
    Switched,
    Stop,
}

enum Next {
    /// Keep decoding from the same route.
    Continue,
    /// Wait for a different default route.
    Park,
    /// Stop the relay.
    Stop,
}

impl BackendRelay {
    pub fn new(
        decoder: RecordDecoder,
        default_route: watch::Receiver<Option<RouteHandle>>,
        output: mpsc::Sender<Bytes>,
    ) -> Self {
        Self {
            decoder,
            default_route,
            output,
            partials: Vec::new(),
        }
    }

    /// Run until shutdown, the engine goes away, or the client queue closes.
    pub async fn run(mut self, mut shutdown: ShutdownListener) {
        tracing::debug!("Backend relay started");
        let mut parked = false;

        loop {
            let route = self.default_route.borrow_and_update().clone();
            let mut route = match route {
                Some(route) if !parked => route,
                _ => {
                    tokio::select! {
                        changed = self.default_route.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            parked = false;
                            self.prune();
                            continue;
                        }
                        _ = shutdown.wait() => break,
                    }
                }
            };

            let slot = self.slot_for(&route);
            let event = {
                let partial = &mut self.partials[slot].1;
                tokio::select! {
                    result = self.decoder.decode_into(&mut route, partial) => Event::Decoded(result),
                    changed = self.default_route.changed() => {
                        if changed.is_err() {
                            Event::Stop
                        } else {
                            Event::Switched
                        }
                    }
                    _ = shutdown.wait() => Event::Stop,
                }
            };

            match event {
                Event::Decoded(result) => match self.deliver(result, &route).await {
                    Next::Continue => {}
                    Next::Park => {
                        self.partials.remove(slot);
                        parked = true;
                    }
                    Next::Stop => break,
                },
                Event::Switched => {
                    let pending = self.partials[slot].1.len();
                    tracing::debug!(
                        endpoint = %route.endpoint(),
                        pending_bytes = pending,
                        "Default route changed, relay switching"
                    );
                    self.prune();
                }
                Event::Stop => break,
            }
        }

        tracing::debug!("Backend relay stopped");
    }

    /// Index of the partial record kept for `route`, created on first use.
    fn slot_for(&mut self, route: &RouteHandle) -> usize {
        match self.partials.iter().position(|(known, _)| known.same_route(route)) {
            Some(slot) => slot,
            None => {
                self.partials.push((route.clone(), PartialRecord::default()));
                self.partials.len() - 1
            }
        }
    }

    /// Drop partial records of routes that can no longer deliver.
    fn prune(&mut self) {
        self.partials
            .retain(|(route, _)| !matches!(route.state(), RouteState::Closed | RouteState::Failed));
    }

    async fn deliver(&self, result: Result<Record, CodecError>, route: &RouteHandle) -> Next {
        match result {
            Ok(record) => {
                tracing::trace!(
                    endpoint = %route.endpoint(),
                    record_type = %record.record_type,
                    length = record.length,
                    "Relaying backend record"
                );
                if self.output.send(record.encode()).await.is_err() {
                    return Next::Stop;
                }
                metrics::record_relayed();
                Next::Continue
            }
            Err(CodecError::MalformedHeader(byte)) => {
                tracing::warn!(
                    endpoint = %route.endpoint(),
                    type_byte = byte,
                    "Malformed record from backend, reconnecting route"
                );
                route.reconnect();
                Next::Continue
            }
            Err(CodecError::Io(e)) => {
                tracing::warn!(endpoint = %route.endpoint(), error = %e, "Backend route unavailable");
                Next::Park
            }
        }
    }
}
