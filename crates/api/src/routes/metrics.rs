//! Prometheus metrics endpoint.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

/// Registers help text for the metrics the checkout core emits.
pub fn describe() {
    ::metrics::describe_counter!("checkout_attempts_total", "Checkout attempts received");
    ::metrics::describe_counter!("checkout_completed_total", "Checkouts that committed");
    ::metrics::describe_counter!(
        "checkout_aborted_total",
        "Checkouts rolled back, labelled by reason"
    );
    ::metrics::describe_histogram!(
        "checkout_duration_seconds",
        ::metrics::Unit::Seconds,
        "Wall time of a checkout attempt"
    );
    ::metrics::describe_counter!(
        "replenishment_requests_created_total",
        "Pending replenishment requests raised by checkouts"
    );
    ::metrics::describe_counter!(
        "cart_mutations_total",
        "Cart line changes, labelled by operation"
    );
}

/// GET /metrics: returns Prometheus-formatted metrics.
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}
