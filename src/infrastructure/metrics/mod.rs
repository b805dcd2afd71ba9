//! Prometheus Metrics Module
//!
//! Exposes gateway metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Ticks**: received and dropped counts from the upstream feed
//! - **Payloads**: undecodable upstream payloads
//! - **Connections**: upstream connection state, reconnect attempts
//! - **Clients**: active downstream clients, broadcast deliveries and
//!   failures
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the gateway HTTP port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::tick::TickKind;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "massive_gateway_ticks_received_total",
        "Normalized ticks emitted by the upstream gateway"
    );
    describe_counter!(
        "massive_gateway_ticks_dropped_total",
        "Data records dropped for an invalid symbol or price"
    );
    describe_counter!(
        "massive_gateway_payloads_dropped_total",
        "Inbound payloads dropped as undecodable"
    );
    describe_counter!(
        "massive_gateway_reconnects_total",
        "Upstream reconnection attempts"
    );

    describe_gauge!(
        "massive_gateway_upstream_connected",
        "Whether the upstream feed socket is open (0/1)"
    );
    describe_gauge!(
        "massive_gateway_clients_active",
        "Active downstream price stream clients"
    );

    describe_counter!(
        "massive_gateway_frames_broadcast_total",
        "Price frames delivered to downstream clients"
    );
    describe_counter!(
        "massive_gateway_broadcast_failures_total",
        "Price frame deliveries that failed on a dead client channel"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record one normalized tick emitted by the gateway.
pub fn record_tick_received(kind: TickKind) {
    counter!(
        "massive_gateway_ticks_received_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a data record dropped for an invalid symbol or price.
pub fn record_tick_dropped() {
    counter!("massive_gateway_ticks_dropped_total").increment(1);
}

/// Record an undecodable inbound payload.
pub fn record_payload_dropped() {
    counter!("massive_gateway_payloads_dropped_total").increment(1);
}

/// Record an upstream reconnection attempt.
pub fn record_reconnect() {
    counter!("massive_gateway_reconnects_total").increment(1);
}

/// Update the upstream connection gauge.
pub fn set_upstream_connected(connected: bool) {
    gauge!("massive_gateway_upstream_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Update the active downstream client gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_clients(count: usize) {
    gauge!("massive_gateway_clients_active").set(count as f64);
}

/// Record price frames delivered to downstream clients.
pub fn record_frames_broadcast(count: u64) {
    counter!("massive_gateway_frames_broadcast_total").increment(count);
}

/// Record a delivery that failed on a dead client channel.
pub fn record_broadcast_failure() {
    counter!("massive_gateway_broadcast_failures_total").increment(1);
}
