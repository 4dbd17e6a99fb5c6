//! Metrics collection and exposition.
//!
//! # Metrics
//! - `records_received_total` (counter): inbound records by type
//! - `records_forwarded_total` (counter): records written to a route, by mode
//! - `records_dropped_total` (counter): records not forwarded, by reason
//! - `records_relayed_total` (counter): backend records queued for the client
//! - `route_reconnects_total` (counter): reconnect cycles by endpoint
//! - `inbound_connections_total` (counter) / `inbound_connection_active` (gauge)
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::codec::RecordType;
use crate::routing::EndPoint;

/// Install the Prometheus recorder with an HTTP scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_inbound(record_type: RecordType) {
    counter!("records_received_total", "type" => record_type.as_str()).increment(1);
}

/// `mode` is `auto` for breakpoint-free records, `operator` for `f`.
pub fn record_forwarded(mode: &'static str) {
    counter!("records_forwarded_total", "mode" => mode).increment(1);
}

pub fn record_dropped(reason: &'static str) {
    counter!("records_dropped_total", "reason" => reason).increment(1);
}

pub fn record_relayed() {
    counter!("records_relayed_total").increment(1);
}

pub fn record_route_reconnect(endpoint: &EndPoint) {
    counter!("route_reconnects_total", "endpoint" => endpoint.to_string()).increment(1);
}

pub fn record_inbound_connection(active: bool) {
    if active {
        counter!("inbound_connections_total").increment(1);
    }
    gauge!("inbound_connection_active").set(if active { 1.0 } else { 0.0 });
}
