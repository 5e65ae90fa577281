//! API Router configuration

use super::metrics_handler::metrics_handler;
use super::ws_handler::ws_handler;
use crate::application::{CallSnapshot, EventBus, SoftphoneHandle};
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// What the dialing panel bridge needs from the running softphone
#[derive(Clone)]
pub struct ApiState {
    pub softphone: SoftphoneHandle,
    pub bus: EventBus,
}

/// Build the API router
pub fn build_router(state: ApiState, prometheus_handle: PrometheusHandle) -> Router {
    let softphone_routes = Router::new()
        .route("/health", get(health_check))
        .route("/state", get(get_state))
        .route("/ws", get(ws_handler))
        .with_state(state);

    // Metrics route (separate state)
    let metrics_routes = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(prometheus_handle);

    Router::new()
        .merge(softphone_routes)
        .merge(metrics_routes)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

pub async fn health_check() -> Json<Value> {
    Json(json!({ "success": true, "data": "OK" }))
}

/// Current call snapshot
pub async fn get_state(
    State(state): State<ApiState>,
) -> Result<Json<CallSnapshot>, (StatusCode, Json<Value>)> {
    state.softphone.snapshot().await.map(Json).map_err(|e| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "success": false, "error": e.to_string() })),
        )
    })
}
