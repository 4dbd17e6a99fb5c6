//! TCP listener for the inbound client side.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections
//! - Report bind and accept failures distinctly

use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Bind(e) | ListenerError::Accept(e) => Some(e),
        }
    }
}

/// Listening socket for client connections.
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    /// Bind to the configured address.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|e| ListenerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;

        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(address = %local_addr, "Listener bound");

        Ok(Self { inner: listener })
    }

    /// Accept the next client connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ListenerError> {
        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;
        tracing::debug!(peer_addr = %addr, "Connection accepted");
        Ok((stream, addr))
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let config = ListenerConfig {
            bind_address: "127.0.0.1:0".into(),
            ..ListenerConfig::default()
        };
        let listener = Listener::bind(&config).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn rejects_unparsable_address() {
        let config = ListenerConfig {
            bind_address: "localhost".into(),
            ..ListenerConfig::default()
        };
        let err = Listener::bind(&config).await.err().unwrap();
        assert!(matches!(err, ListenerError::Bind(_)));
        assert!(err.to_string().starts_with("Failed to bind"));
    }
}
