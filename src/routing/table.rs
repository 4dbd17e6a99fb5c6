//! Route table.
//!
//! # Responsibilities
//! - Store routes keyed by endpoint
//! - Track the default route used for forwarding
//! - Close routes when they are removed or replaced
//!
//! # Design Decisions
//! - Owned by the interception engine; no interior locking
//! - The first route added to an empty table becomes the default
//! - Removing the default clears it rather than picking a successor
//! - Re-adding an endpoint replaces its route and closes the old one

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::routing::endpoint::EndPoint;
use crate::routing::route::{RouteError, RouteHandle};

/// Keyed collection of reliable routes plus the default route.
#[derive(Debug)]
pub struct RouteTable {
    routes: HashMap<EndPoint, RouteHandle>,
    default: Option<EndPoint>,
    max_dial_attempts: u32,
}

impl RouteTable {
    /// Create an empty table. Routes are dialed with `max_dial_attempts`.
    pub fn new(max_dial_attempts: u32) -> Self {
        Self {
            routes: HashMap::new(),
            default: None,
            max_dial_attempts,
        }
    }

    /// Open a route to `endpoint` and insert it.
    ///
    /// Waits until the route is ready. An existing route for the same
    /// endpoint is replaced and closed.
    pub async fn add(&mut self, endpoint: EndPoint) -> Result<&RouteHandle, RouteError> {
        let handle = RouteHandle::open(endpoint, self.max_dial_attempts).await?;

        if self.routes.is_empty() {
            self.default = Some(endpoint);
        }

        let handle = match self.routes.entry(endpoint) {
            Entry::Occupied(mut slot) => {
                let previous = slot.insert(handle);
                previous.close();
                tracing::info!(endpoint = %endpoint, "Route replaced");
                slot.into_mut()
            }
            Entry::Vacant(slot) => {
                tracing::info!(endpoint = %endpoint, "Route added");
                slot.insert(handle)
            }
        };
        Ok(handle)
    }

    /// Close and discard the route for `endpoint`.
    pub fn remove(&mut self, endpoint: &EndPoint) -> Result<(), RouteError> {
        let handle = self
            .routes
            .remove(endpoint)
            .ok_or(RouteError::NotFound(*endpoint))?;
        handle.close();

        if self.default == Some(*endpoint) {
            tracing::warn!(endpoint = %endpoint, "Default route removed; no default route is set");
            self.default = None;
        }
        tracing::info!(endpoint = %endpoint, "Route removed");
        Ok(())
    }

    /// Make `endpoint` the default route.
    pub fn set_default(&mut self, endpoint: &EndPoint) -> Result<(), RouteError> {
        if !self.routes.contains_key(endpoint) {
            return Err(RouteError::NotFound(*endpoint));
        }
        self.default = Some(*endpoint);
        tracing::info!(endpoint = %endpoint, "Default route set");
        Ok(())
    }

    /// Snapshot of all endpoints and whether each is the default. Unordered.
    pub fn list(&self) -> Vec<(EndPoint, bool)> {
        self.routes
            .keys()
            .map(|ep| (*ep, self.default == Some(*ep)))
            .collect()
    }

    pub fn default_endpoint(&self) -> Option<EndPoint> {
        self.default
    }

    /// The route records are forwarded to, if any.
    pub fn default_route(&self) -> Option<&RouteHandle> {
        self.default.and_then(|ep| self.routes.get(&ep))
    }

    pub fn get(&self, endpoint: &EndPoint) -> Option<&RouteHandle> {
        self.routes.get(endpoint)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Close every route and empty the table.
    pub fn close_all(&mut self) {
        for (_, handle) in self.routes.drain() {
            handle.close();
        }
        self.default = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::route::RouteState;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    async fn backend() -> (TcpListener, EndPoint) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, EndPoint::new(Ipv4Addr::LOCALHOST, port))
    }

    #[tokio::test]
    async fn first_route_becomes_default() {
        let (_l1, ep1) = backend().await;
        let (_l2, ep2) = backend().await;
        let mut table = RouteTable::new(5);

        table.add(ep1).await.unwrap();
        assert_eq!(table.default_endpoint(), Some(ep1));

        table.add(ep2).await.unwrap();
        assert_eq!(table.default_endpoint(), Some(ep1));

        let mut listed = table.list();
        listed.sort();
        assert_eq!(listed, vec![(ep1, true), (ep2, false)]);
    }

    #[tokio::test]
    async fn set_default_requires_known_route() {
        let (_l1, ep1) = backend().await;
        let (_l2, ep2) = backend().await;
        let mut table = RouteTable::new(5);
        table.add(ep1).await.unwrap();

        assert!(matches!(table.set_default(&ep2), Err(RouteError::NotFound(ep)) if ep == ep2));

        table.add(ep2).await.unwrap();
        table.set_default(&ep2).unwrap();
        assert_eq!(table.default_route().map(|r| r.endpoint()), Some(ep2));
    }

    #[tokio::test]
    async fn removing_default_clears_it() {
        let (_l1, ep1) = backend().await;
        let (_l2, ep2) = backend().await;
        let mut table = RouteTable::new(5);
        table.add(ep1).await.unwrap();
        table.add(ep2).await.unwrap();
        let removed = table.get(&ep1).cloned().unwrap();

        table.remove(&ep1).unwrap();
        assert_eq!(table.default_endpoint(), None);
        assert!(table.default_route().is_none());
        assert_eq!(table.len(), 1);

        let mut buf = [0u8; 1];
        assert!(matches!(removed.read(&mut buf).await, Err(RouteError::Closed(_))));
        assert!(matches!(table.remove(&ep1), Err(RouteError::NotFound(_))));
    }

    #[tokio::test]
    async fn re_adding_replaces_and_closes() {
        let (_l1, ep1) = backend().await;
        let mut table = RouteTable::new(5);
        table.add(ep1).await.unwrap();
        let original = table.get(&ep1).cloned().unwrap();

        table.add(ep1).await.unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.default_endpoint(), Some(ep1));
        assert!(!original.same_route(table.get(&ep1).unwrap()));

        let mut buf = [0u8; 1];
        assert!(original.read(&mut buf).await.is_err());
        assert_eq!(original.state(), RouteState::Closed);
    }

    #[tokio::test]
    async fn failed_dial_leaves_table_untouched() {
        let (listener, ep) = backend().await;
        drop(listener);
        let mut table = RouteTable::new(2);

        assert!(matches!(table.add(ep).await, Err(RouteError::DialFailed { .. })));
        assert!(table.is_empty());
        assert_eq!(table.default_endpoint(), None);
    }

    #[tokio::test]
    async fn close_all_empties_table() {
        let (_l1, ep1) = backend().await;
        let mut table = RouteTable::new(5);
        table.add(ep1).await.unwrap();
        table.close_all();
        assert!(table.is_empty());
        assert_eq!(table.default_endpoint(), None);
    }
}
