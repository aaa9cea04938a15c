//! Metrics collection and export for Huddle.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use huddle_core::{HubHandle, HubStats};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

/// How often hub gauges are refreshed.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "huddle_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "huddle_connections_active";
    pub const MESSAGES_TOTAL: &str = "huddle_messages_total";
    pub const MESSAGES_BYTES: &str = "huddle_messages_bytes";
    pub const ROOMS_ACTIVE: &str = "huddle_rooms_active";
    pub const CLIENTS_REGISTERED: &str = "huddle_clients_registered";
    pub const EVICTIONS_TOTAL: &str = "huddle_evictions_total";
    pub const ERRORS_TOTAL: &str = "huddle_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    // Describe metrics
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of frames carried");
    metrics::describe_counter!(names::MESSAGES_BYTES, "Total bytes of frames carried");
    metrics::describe_gauge!(names::ROOMS_ACTIVE, "Current number of live rooms");
    metrics::describe_gauge!(
        names::CLIENTS_REGISTERED,
        "Current number of clients registered with the hub"
    );
    metrics::describe_counter!(
        names::EVICTIONS_TOTAL,
        "Clients dropped for a full or closed outbound queue"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Periodically copy hub statistics into gauges.
pub fn spawn_hub_sampler(hub: HubHandle) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
        while !hub.is_closed() {
            ticker.tick().await;
            record_hub_stats(hub.stats());
        }
    })
}

/// Record a hub statistics sample.
pub fn record_hub_stats(stats: HubStats) {
    gauge!(names::ROOMS_ACTIVE).set(stats.room_count as f64);
    gauge!(names::CLIENTS_REGISTERED).set(stats.client_count as f64);
    counter!(names::EVICTIONS_TOTAL).absolute(stats.evictions);
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a frame.
pub fn record_message(bytes: usize, direction: &'static str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction).increment(1);
    counter!(names::MESSAGES_BYTES, "direction" => direction).increment(bytes as u64);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
