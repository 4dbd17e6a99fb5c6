//! Backend endpoint identity and resolution.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use thiserror::Error;

/// Errors from turning an operator-supplied host into an endpoint.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// DNS lookup failed.
    #[error("cannot resolve '{host}': {source}")]
    Lookup {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// The host resolved, but not to any IPv4 address.
    #[error("no IPv4 address found for '{host}'")]
    NoIpv4 { host: String },
}

/// IPv4 address and port of a backend. Unique key of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndPoint {
    ip: Ipv4Addr,
    port: u16,
}

impl EndPoint {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Socket address to dial.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
    }

    /// Resolve `host` and pick its first IPv4 address.
    pub async fn resolve(host: &str, port: u16) -> Result<Self, ResolveError> {
        let addrs = tokio::net::lookup_host((host, port))
            .await
            .map_err(|source| ResolveError::Lookup {
                host: host.to_string(),
                source,
            })?;

        addrs
            .filter_map(|addr| match addr {
                SocketAddr::V4(v4) => Some(EndPoint::from(v4)),
                SocketAddr::V6(_) => None,
            })
            .next()
            .ok_or_else(|| ResolveError::NoIpv4 {
                host: host.to_string(),
            })
    }
}

impl From<SocketAddrV4> for EndPoint {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

impl fmt::Display for EndPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}
