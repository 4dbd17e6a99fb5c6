//! Startup orchestration.
//!
//! # Responsibilities
//! - Create the record and backend byte queues
//! - Build the engine and add configured routes
//! - Start background tasks (backend relay, acceptor)
//! - Bind the listener and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: a bind error or an unknown breakpoint byte is fatal
//! - Subsystems initialize in order, not concurrently
//! - Configured routes are dialed before the listener accepts traffic

use bytes::Bytes;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::codec::{Record, RecordDecoder};
use crate::config::validation::ValidationError;
use crate::config::ProxyConfig;
use crate::intercept::{BreakpointSet, EngineExit, InterceptionEngine, Operator};
use crate::lifecycle::shutdown::Shutdown;
use crate::net::acceptor::Acceptor;
use crate::net::listener::{Listener, ListenerError};
use crate::routing::{BackendRelay, RouteTable};

/// Error type for startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Invalid breakpoints: {0}")]
    Breakpoints(#[from] ValidationError),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// A started interceptor, ready to run its engine.
pub struct Startup {
    local_addr: SocketAddr,
    engine: InterceptionEngine,
    records: mpsc::Receiver<Record>,
}

impl Startup {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run the engine on the current task until it exits.
    pub async fn run(self, interrupts: mpsc::Receiver<()>) -> EngineExit {
        self.engine.run(self.records, interrupts).await
    }
}

/// Wire every subsystem from a validated config.
///
/// Background tasks stop when `shutdown` is triggered.
pub async fn start(
    config: &ProxyConfig,
    operator: Operator,
    shutdown: &Shutdown,
) -> Result<Startup, StartupError> {
    let breakpoints = BreakpointSet::from_bytes(&config.engine.breakpoints)?;
    let decoder = RecordDecoder::new(&config.codec);
    let capacity = config.engine.queue_capacity;
    let (records_tx, records_rx) = mpsc::channel::<Record>(capacity);
    let (bytes_tx, bytes_rx) = mpsc::channel::<Bytes>(capacity);

    let table = RouteTable::new(config.routes.max_dial_attempts);
    let mut engine = InterceptionEngine::new(table, breakpoints, operator);
    engine.add_initial_routes(&config.routes.initial).await;

    tracing::info!(
        breakpoints = ?engine.breakpoints().iter().collect::<Vec<_>>(),
        routes = engine.routes().len(),
        queue_capacity = capacity,
        "Interception engine ready"
    );

    let relay = BackendRelay::new(decoder, engine.default_route_watch(), bytes_tx);
    tokio::spawn(relay.run(shutdown.subscribe()));

    let listener = Listener::bind(&config.listener).await?;
    let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;
    let acceptor = Acceptor::new(
        listener,
        decoder,
        records_tx,
        bytes_rx,
        config.listener.max_accept_failures,
    );
    tokio::spawn(acceptor.run(shutdown.subscribe()));

    Ok(Startup {
        local_addr,
        engine,
        records: records_rx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "127.0.0.1:0".into();
        config
    }

    #[tokio::test]
    async fn unknown_breakpoint_byte_fails_startup() {
        let mut config = config();
        config.engine.breakpoints = vec![0x17, 1];
        let shutdown = Shutdown::new();
        let (operator, _console) = Operator::channel(1);

        let err = match start(&config, operator, &shutdown).await {
            Ok(_) => panic!("startup accepted breakpoint byte 1"),
            Err(e) => e,
        };
        assert!(matches!(
            err,
            StartupError::Breakpoints(ValidationError::UnknownBreakpoint(1))
        ));
        assert!(err.to_string().contains("Invalid breakpoints"));
    }

    #[tokio::test]
    async fn configured_breakpoints_reach_the_engine() {
        let mut config = config();
        config.engine.breakpoints = vec![0x16];
        let shutdown = Shutdown::new();
        let (operator, _console) = Operator::channel(1);

        let startup = match start(&config, operator, &shutdown).await {
            Ok(startup) => startup,
            Err(e) => panic!("startup failed: {e}"),
        };
        let types: Vec<_> = startup.engine.breakpoints().iter().collect();
        assert_eq!(types, vec![crate::codec::RecordType::Handshake]);
        shutdown.trigger();
    }
}
