//! Self-healing outbound route.
//!
//! # Responsibilities
//! - Own one backend TCP connection at a time
//! - Reconnect after read/write failures, transparently to callers
//! - Stop for good on close or after exhausting dial attempts
//!
//! # State Transitions
//! ```text
//! Connecting → Ready: dial succeeded (new generation)
//! Connecting → Failed: dial attempts exhausted
//! Ready → Restarting: restart request for the current generation
//! Restarting → Connecting: no close pending
//! Ready | Restarting | Connecting → Closed: close request
//! ```
//!
//! # Design Decisions
//! - A background task owns the state machine; callers talk to it through an
//!   mpsc control channel and observe it through a watch channel
//! - Restart requests carry the generation they observed, so a failure seen
//!   by several callers triggers one reconnect
//! - No dial backoff and no I/O timeouts

use std::fmt;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch, Mutex};

use crate::codec::ChunkSource;
use crate::observability::metrics;
use crate::routing::endpoint::EndPoint;

/// Route lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    /// Dialing the backend.
    Connecting,
    /// Connection usable by reads and writes.
    Ready,
    /// Tearing down a broken connection before redialing.
    Restarting,
    /// Closed on request. Terminal.
    Closed,
    /// Dial attempts exhausted. Terminal.
    Failed,
}

/// Errors surfaced by routes and the route table.
#[derive(Debug, Clone, Error)]
pub enum RouteError {
    #[error("No such route: {0}")]
    NotFound(EndPoint),

    #[error("Route {endpoint} unreachable after {attempts} dial attempts")]
    DialFailed { endpoint: EndPoint, attempts: u32 },

    #[error("Route {0} is closed")]
    Closed(EndPoint),

    #[error("Route {0} could not reconnect")]
    Failed(EndPoint),
}

struct Connection {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
}

/// Snapshot published by the state machine.
#[derive(Clone)]
struct Link {
    generation: u64,
    state: RouteState,
    connection: Option<Arc<Connection>>,
}

enum Control {
    Restart { generation: u64 },
    Close,
}

/// Handle to a reliable route. Cheap to clone; all clones share one machine.
#[derive(Clone)]
pub struct RouteHandle {
    endpoint: EndPoint,
    control: mpsc::UnboundedSender<Control>,
    link: watch::Receiver<Link>,
}

impl RouteHandle {
    /// Start the route and wait until it is first ready.
    pub async fn open(endpoint: EndPoint, max_dial_attempts: u32) -> Result<Self, RouteError> {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (link_tx, link_rx) = watch::channel(Link {
            generation: 0,
            state: RouteState::Connecting,
            connection: None,
        });

        let machine = RouteMachine {
            endpoint,
            max_dial_attempts: max_dial_attempts.max(1),
            control: control_rx,
            link: link_tx,
            generation: 0,
        };
        tokio::spawn(machine.run());

        let handle = Self {
            endpoint,
            control: control_tx,
            link: link_rx,
        };

        let mut link = handle.link.clone();
        let state = link
            .wait_for(|l| l.state != RouteState::Connecting)
            .await
            .map(|l| l.state)
            .unwrap_or(RouteState::Closed);

        match state {
            RouteState::Ready | RouteState::Restarting => Ok(handle),
            RouteState::Failed => Err(RouteError::DialFailed {
                endpoint,
                attempts: max_dial_attempts.max(1),
            }),
            RouteState::Connecting | RouteState::Closed => Err(RouteError::Closed(endpoint)),
        }
    }

    pub fn endpoint(&self) -> EndPoint {
        self.endpoint
    }

    /// Current state of the machine.
    pub fn state(&self) -> RouteState {
        self.link.borrow().state
    }

    /// Number of successful dials so far.
    pub fn generation(&self) -> u64 {
        self.link.borrow().generation
    }

    /// True if both handles drive the same machine.
    pub fn same_route(&self, other: &RouteHandle) -> bool {
        self.control.same_channel(&other.control)
    }

    /// Read into `buf`, retrying across reconnects.
    ///
    /// Returns an error only once the route is closed or failed.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, RouteError> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut link = self.link.clone();
        loop {
            let current = link.borrow_and_update().clone();
            let connection = match self.usable(&current)? {
                Some(connection) => connection,
                None => {
                    self.await_change(&mut link).await?;
                    continue;
                }
            };

            let outcome = {
                let mut reader = connection.reader.lock().await;
                tokio::select! {
                    res = reader.read(buf) => Some(res),
                    changed = link.changed() => {
                        changed.map_err(|_| RouteError::Closed(self.endpoint))?;
                        None
                    }
                }
            };

            match outcome {
                Some(Ok(0)) => {
                    tracing::debug!(endpoint = %self.endpoint, "Backend closed the connection");
                    self.restart(current.generation, &mut link).await?;
                }
                Some(Ok(n)) => return Ok(n),
                Some(Err(e)) => {
                    tracing::warn!(endpoint = %self.endpoint, error = %e, "Route read failed");
                    self.restart(current.generation, &mut link).await?;
                }
                None => {}
            }
        }
    }

    /// Write all of `buf`, retrying on a fresh connection after failures.
    ///
    /// Returns an error only once the route is closed or failed.
    pub async fn write_all(&self, buf: &[u8]) -> Result<(), RouteError> {
        let mut link = self.link.clone();
        loop {
            let current = link.borrow_and_update().clone();
            let connection = match self.usable(&current)? {
                Some(connection) => connection,
                None => {
                    self.await_change(&mut link).await?;
                    continue;
                }
            };

            let outcome = {
                let mut writer = connection.writer.lock().await;
                tokio::select! {
                    res = writer.write_all(buf) => Some(res),
                    changed = link.changed() => {
                        changed.map_err(|_| RouteError::Closed(self.endpoint))?;
                        None
                    }
                }
            };

            match outcome {
                Some(Ok(())) => return Ok(()),
                Some(Err(e)) => {
                    tracing::warn!(endpoint = %self.endpoint, error = %e, "Route write failed");
                    self.restart(current.generation, &mut link).await?;
                }
                None => {}
            }
        }
    }

    /// Ask the machine to drop the current connection and redial.
    pub fn reconnect(&self) {
        let generation = self.generation();
        let _ = self.control.send(Control::Restart { generation });
    }

    /// Request termination. Never blocks; repeated calls are harmless.
    pub fn close(&self) {
        let _ = self.control.send(Control::Close);
    }

    /// Map a snapshot to a usable connection, a reason to wait, or a terminal error.
    fn usable(&self, link: &Link) -> Result<Option<Arc<Connection>>, RouteError> {
        match link.state {
            RouteState::Ready => Ok(link.connection.clone()),
            RouteState::Connecting | RouteState::Restarting => Ok(None),
            RouteState::Closed => Err(RouteError::Closed(self.endpoint)),
            RouteState::Failed => Err(RouteError::Failed(self.endpoint)),
        }
    }

    async fn await_change(&self, link: &mut watch::Receiver<Link>) -> Result<(), RouteError> {
        link.changed()
            .await
            .map_err(|_| RouteError::Closed(self.endpoint))
    }

    async fn restart(&self, generation: u64, link: &mut watch::Receiver<Link>) -> Result<(), RouteError> {
        self.control
            .send(Control::Restart { generation })
            .map_err(|_| RouteError::Closed(self.endpoint))?;
        self.await_change(link).await
    }
}

impl fmt::Debug for RouteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteHandle")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

impl ChunkSource for RouteHandle {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read(buf).await.map_err(io::Error::other)
    }
}

enum Dialed {
    Connected(TcpStream),
    Exhausted,
    CloseRequested,
}

/// Background task owning the connection.
struct RouteMachine {
    endpoint: EndPoint,
    max_dial_attempts: u32,
    control: mpsc::UnboundedReceiver<Control>,
    link: watch::Sender<Link>,
    generation: u64,
}

impl RouteMachine {
    async fn run(mut self) {
        loop {
            self.publish(RouteState::Connecting, None);

            let stream = match self.dial().await {
                Dialed::Connected(stream) => stream,
                Dialed::Exhausted => {
                    tracing::error!(
                        endpoint = %self.endpoint,
                        attempts = self.max_dial_attempts,
                        "Route dial attempts exhausted"
                    );
                    self.publish(RouteState::Failed, None);
                    return;
                }
                Dialed::CloseRequested => break,
            };

            self.generation += 1;
            let (reader, writer) = stream.into_split();
            self.publish(
                RouteState::Ready,
                Some(Arc::new(Connection {
                    reader: Mutex::new(reader),
                    writer: Mutex::new(writer),
                })),
            );
            tracing::info!(endpoint = %self.endpoint, generation = self.generation, "Route ready");

            if self.wait_for_restart().await {
                break;
            }

            self.publish(RouteState::Restarting, None);
            metrics::record_route_reconnect(&self.endpoint);
            if self.close_pending() {
                break;
            }
            tracing::warn!(endpoint = %self.endpoint, "Route connection lost, reconnecting");
        }

        self.publish(RouteState::Closed, None);
        tracing::info!(endpoint = %self.endpoint, "Route closed");
    }

    async fn dial(&mut self) -> Dialed {
        let addr = self.endpoint.socket_addr();
        for attempt in 1..=self.max_dial_attempts {
            if self.close_pending() {
                return Dialed::CloseRequested;
            }
            match TcpStream::connect(addr).await {
                Ok(stream) => return Dialed::Connected(stream),
                Err(e) => {
                    tracing::warn!(endpoint = %self.endpoint, attempt, error = %e, "Route dial failed");
                }
            }
        }
        Dialed::Exhausted
    }

    /// Block while ready. Returns true if the route should close.
    async fn wait_for_restart(&mut self) -> bool {
        loop {
            match self.control.recv().await {
                Some(Control::Restart { generation }) if generation == self.generation => return false,
                Some(Control::Restart { .. }) => continue,
                Some(Control::Close) | None => return true,
            }
        }
    }

    /// Drain queued requests; any close (or every handle gone) wins.
    fn close_pending(&mut self) -> bool {
        loop {
            match self.control.try_recv() {
                Ok(Control::Close) | Err(TryRecvError::Disconnected) => return true,
                Ok(Control::Restart { .. }) => continue,
                Err(TryRecvError::Empty) => return false,
            }
        }
    }

    fn publish(&self, state: RouteState, connection: Option<Arc<Connection>>) {
        self.link.send_replace(Link {
            generation: self.generation,
            state,
            connection,
        });
    }
}
