//! HTTP surface of the dialing panel bridge

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt; // For `oneshot`
use yakphone::application::{Collaborators, EventBus, SoftphoneHandle, SoftphoneService, UserAgent};
use yakphone::config::Config;
use yakphone::domain::session::transport_channel;
use yakphone::infrastructure::media::{LoggingNotifier, LoggingRingtonePlayer, SimulatedMediaDevices};
use yakphone::infrastructure::persistence::{InMemoryContactRepository, InMemoryPhonecallRepository};
use yakphone::infrastructure::protocols::DemoTransport;
use yakphone::interface::api::{build_router, ApiState};

fn setup() -> (Router, SoftphoneHandle) {
    let config = Config::default();
    let bus = EventBus::default();
    let (tx, rx) = transport_channel();

    let agent = UserAgent::new(
        Collaborators {
            transport: Arc::new(DemoTransport::new(tx, Duration::from_secs(60))),
            media: Arc::new(SimulatedMediaDevices::new()),
            ringtones: Arc::new(LoggingRingtonePlayer),
            notifier: Arc::new(LoggingNotifier::new()),
            contacts: Arc::new(InMemoryContactRepository::new()),
            phonecalls: Arc::new(InMemoryPhonecallRepository::new()),
        },
        &config,
        bus.clone(),
    );
    let (service, softphone) = SoftphoneService::new(agent, rx);
    service.spawn();

    // A private recorder: the global one can only be installed once per process
    let prometheus_handle = PrometheusBuilder::new().build_recorder().handle();
    let app = build_router(
        ApiState {
            softphone: softphone.clone(),
            bus,
        },
        prometheus_handle,
    );
    (app, softphone)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health_check() {
    let (app, _softphone) = setup();

    let (status, json) = get_json(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"], "OK");
}

#[tokio::test]
async fn test_state_follows_the_call() {
    let (app, softphone) = setup();

    let (status, json) = get_json(app.clone(), "/state").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "no_call");

    softphone.make_call("5551234", None).await.unwrap();
    let (_, json) = get_json(app, "/state").await;
    assert_eq!(json["state"], "ringing");
    assert_eq!(json["direction"], "outgoing");
    assert_eq!(json["params"]["number"], "5551234");
}

#[tokio::test]
async fn test_metrics_endpoint_is_mounted() {
    let (app, _softphone) = setup();

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
