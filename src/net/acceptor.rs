//! Inbound accept loop.
//!
//! # Responsibilities
//! - Serve one client connection at a time
//! - Decode client records and queue them for the engine in wire order
//! - Write relayed backend bytes back to the active client
//!
//! # Design Decisions
//! - Exactly one writer task per connection, cancelled when the read side ends,
//!   even while blocked writing to a client that stopped reading
//! - The writer hands the backend byte queue back so the next client reuses it
//! - Consecutive accept failures are bounded; a success resets the count

use bytes::Bytes;
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::codec::{CodecError, Record, RecordDecoder};
use crate::lifecycle::ShutdownListener;
use crate::net::connection::{ActiveConnection, ConnectionId};
use crate::net::listener::Listener;
use crate::observability::metrics;

/// Accepts clients and feeds their records to the engine.
pub struct Acceptor {
    listener: Listener,
    decoder: RecordDecoder,
    records: mpsc::Sender<Record>,
    backend_bytes: mpsc::Receiver<Bytes>,
    max_accept_failures: u32,
}

/// How serving one connection ended.
#[derive(Debug, PartialEq, Eq)]
enum Served {
    /// Client went away or broke framing; accept the next one.
    Disconnected,
    /// The engine stopped consuming records.
    RecordsClosed,
    /// The writer task died and took the backend byte queue with it.
    WriterFailed,
    Shutdown,
}

impl Acceptor {
    pub fn new(
        listener: Listener,
        decoder: RecordDecoder,
        records: mpsc::Sender<Record>,
        backend_bytes: mpsc::Receiver<Bytes>,
        max_accept_failures: u32,
    ) -> Self {
        Self {
            listener,
            decoder,
            records,
            backend_bytes,
            max_accept_failures,
        }
    }

    /// Accept and serve clients until shutdown, the engine goes away, or
    /// too many accepts fail in a row.
    pub async fn run(self, mut shutdown: ShutdownListener) {
        let Acceptor {
            listener,
            decoder,
            records,
            mut backend_bytes,
            max_accept_failures,
        } = self;
        let mut failures = 0u32;

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown.wait() => break,
            };

            let (stream, peer) = match accepted {
                Ok(accepted) => {
                    failures = 0;
                    accepted
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(error = %e, failures, "Accept failed");
                    if failures >= max_accept_failures {
                        tracing::error!(failures, "Too many consecutive accept failures, acceptor stopping");
                        break;
                    }
                    continue;
                }
            };

            let (served, queue) =
                serve(stream, peer, &decoder, &records, backend_bytes, &mut shutdown).await;
            backend_bytes = queue;

            match served {
                Served::Disconnected => {}
                Served::RecordsClosed => {
                    tracing::debug!("Record queue closed, acceptor stopping");
                    break;
                }
                Served::WriterFailed => {
                    tracing::error!("Writer task failed, acceptor stopping");
                    break;
                }
                Served::Shutdown => break,
            }
        }

        tracing::info!("Acceptor stopped");
    }
}

/// Serve one client until its read side ends. Returns the backend byte
/// queue reclaimed from the writer task.
async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    decoder: &RecordDecoder,
    records: &mpsc::Sender<Record>,
    backend_bytes: mpsc::Receiver<Bytes>,
    shutdown: &mut ShutdownListener,
) -> (Served, mpsc::Receiver<Bytes>) {
    let mut conn = ActiveConnection::open(peer);
    let (mut reader, writer) = stream.into_split();

    let cancel = CancellationToken::new();
    let writer_task = tokio::spawn(write_back(writer, backend_bytes, cancel.clone(), conn.id()));

    let served = loop {
        let decoded = tokio::select! {
            decoded = decoder.decode(&mut reader) => decoded,
            _ = shutdown.wait() => break Served::Shutdown,
        };

        match decoded {
            Ok(record) => {
                conn.record_received();
                metrics::record_inbound(record.record_type);
                tracing::debug!(
                    connection_id = %conn.id(),
                    record_type = %record.record_type,
                    length = record.length,
                    "Record received"
                );
                if records.send(record.with_remote(peer)).await.is_err() {
                    break Served::RecordsClosed;
                }
            }
            Err(CodecError::MalformedHeader(byte)) => {
                tracing::warn!(
                    connection_id = %conn.id(),
                    type_byte = byte,
                    "Malformed record from client, closing connection"
                );
                break Served::Disconnected;
            }
            Err(CodecError::Io(e)) => {
                tracing::debug!(connection_id = %conn.id(), error = %e, "Client read ended");
                break Served::Disconnected;
            }
        }
    };

    cancel.cancel();
    match reclaim_queue(writer_task.await, conn.id()) {
        Ok(queue) => (served, queue),
        Err(failed) => {
            let (_, fresh) = mpsc::channel(1);
            (failed, fresh)
        }
    }
}

/// Take the backend byte queue back from a finished writer task.
fn reclaim_queue(
    joined: Result<mpsc::Receiver<Bytes>, JoinError>,
    id: ConnectionId,
) -> Result<mpsc::Receiver<Bytes>, Served> {
    joined.map_err(|e| {
        tracing::error!(connection_id = %id, error = %e, "Writer task failed");
        Served::WriterFailed
    })
}

/// Copy relayed backend bytes to the client until cancelled.
///
/// A write blocked on a client that stopped reading is abandoned on
/// cancel; the write half is dropped rather than flushed.
async fn write_back(
    mut writer: OwnedWriteHalf,
    mut queue: mpsc::Receiver<Bytes>,
    cancel: CancellationToken,
    id: ConnectionId,
) -> mpsc::Receiver<Bytes> {
    let cancelled = loop {
        let bytes = tokio::select! {
            biased;
            _ = cancel.cancelled() => break true,
            bytes = queue.recv() => bytes,
        };
        let Some(bytes) = bytes else { break false };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break true,
            written = writer.write_all(&bytes) => {
                if let Err(e) = written {
                    tracing::warn!(connection_id = %id, error = %e, "Write to client failed");
                    break false;
                }
            }
        }
    };

    if !cancelled {
        let _ = writer.shutdown().await;
    }
    tracing::debug!(connection_id = %id, cancelled, "Writer stopped");
    queue
}
