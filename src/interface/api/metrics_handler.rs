//! Prometheus metrics handler

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder and describe the softphone metrics
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(
        "softphone_calls_total",
        "Calls started, by direction"
    );
    describe_counter!(
        "softphone_calls_failed_total",
        "Calls that ended without being answered, by reason"
    );
    describe_counter!(
        "softphone_calls_completed_total",
        "Established calls that ended normally"
    );
    describe_gauge!(
        "softphone_call_active",
        "1 while a call occupies the line"
    );

    Ok(handle)
}

/// HTTP metrics handler
pub async fn metrics_handler(State(prometheus_handle): State<PrometheusHandle>) -> Response {
    (StatusCode::OK, prometheus_handle.render()).into_response()
}
