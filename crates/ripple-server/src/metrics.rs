//! Metrics collection and export for Ripple.
//!
//! Uses the `metrics` crate for instrumentation and exports to
//! Prometheus format. Counters are driven by an observer registered on
//! the core's hook points; the core itself is never patched or wrapped.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use ripple_core::EventObserver;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "ripple_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "ripple_connections_active";
    pub const EVENTS_TOTAL: &str = "ripple_events_total";
    pub const DELIVERIES_TOTAL: &str = "ripple_deliveries_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of sessions connected since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of connected sessions"
    );
    metrics::describe_counter!(names::EVENTS_TOTAL, "Total number of events emitted");
    metrics::describe_counter!(
        names::DELIVERIES_TOTAL,
        "Total number of per-session deliveries"
    );

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

/// Observer feeding the core's hook points into the `metrics` facade.
#[derive(Debug, Default)]
pub struct MetricsObserver;

impl EventObserver for MetricsObserver {
    fn on_connect(&self, _sid: &str, namespace: &str) {
        counter!(names::CONNECTIONS_TOTAL, "namespace" => namespace.to_string()).increment(1);
        gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
    }

    fn on_disconnect(&self, _sid: &str, _namespace: &str) {
        gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
    }

    fn pre_emit(&self, event: &str, namespace: &str, _room: Option<&str>) {
        counter!(
            names::EVENTS_TOTAL,
            "event" => event.to_string(),
            "namespace" => namespace.to_string()
        )
        .increment(1);
    }

    fn post_emit(&self, _event: &str, _namespace: &str, _room: Option<&str>, delivered: usize) {
        counter!(names::DELIVERIES_TOTAL).increment(delivered as u64);
    }
}
