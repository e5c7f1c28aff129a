// HTTP API tests, driving the router in-process

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::*;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;
use wyoming_trigger::{
    create_router, AppState, DeviceEndpoints, Event, PeerRole, SessionRegistry, StaticDirectory,
    TriggerGateway,
};

fn app(devices: Vec<(&str, DeviceEndpoints)>) -> (Router, SessionRegistry) {
    let (registry, board) = registry();
    let mut directory = StaticDirectory::new();
    for (device_id, endpoints) in devices {
        directory.insert(device_id, endpoints);
    }
    let gateway = TriggerGateway::new(Arc::new(directory), registry.clone());
    (create_router(AppState::new(gateway, board)), registry)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health() {
    let (app, _registry) = app(Vec::new());
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_trigger_unknown_device_is_not_found() {
    let (app, _registry) = app(Vec::new());
    let (status, body) = call(&app, "POST", "/devices/garage/trigger", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("garage"));
}

#[tokio::test]
async fn test_trigger_invalid_device_is_bad_request() {
    let (app, _registry) = app(Vec::new());
    let (status, _body) = call(&app, "POST", "/devices/bad$id/trigger", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_trigger_runs_session_and_exposes_result() {
    let (satellite, _satellite_task) = streaming_satellite(vec![b"c".to_vec()]).await;
    let (asr, asr_task) = transcribing_asr("open the blinds").await;
    let (app, _registry) = app(vec![("kitchen", endpoints(satellite, asr))]);

    let (status, accepted) = call(
        &app,
        "POST",
        "/devices/kitchen/trigger",
        Some(serde_json::json!({ "language": "nl" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(accepted["device_id"], "kitchen");
    let session_id: Uuid = accepted["session_id"].as_str().unwrap().parse().unwrap();

    let mut finished = Value::Null;
    for _ in 0..500 {
        let (status, snapshot) = call(&app, "GET", &format!("/sessions/{}", session_id), None).await;
        assert_eq!(status, StatusCode::OK);
        if snapshot["outcome"].is_string() {
            finished = snapshot;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(finished["state"], "success");
    assert_eq!(finished["transcript"], "open the blinds");

    let asr_seen = join(asr_task).await;
    assert!(matches!(
        &asr_seen[0],
        Event::Transcribe(t) if t.language.as_deref() == Some("nl")
    ));

    let mut result = (StatusCode::NOT_FOUND, Value::Null);
    for _ in 0..500 {
        result = call(&app, "GET", "/devices/kitchen/result", None).await;
        if result.0 == StatusCode::OK {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(result.0, StatusCode::OK);
    assert_eq!(result.1["outcome"], "success");
    assert_eq!(result.1["text"], "open the blinds");

    // Looked up with the same normalization the trigger route applies
    let (status, padded) = call(&app, "GET", "/devices/%20kitchen%20/result", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(padded["session_id"], result.1["session_id"]);

    let (status, _) = call(&app, "GET", "/devices/bad$id/result", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_busy_device_conflicts_and_cancel_frees_it() {
    let (satellite, _satellite_task) = spawn_peer(PeerRole::Satellite, |mut conn| async move {
        drain(&mut conn).await
    })
    .await;
    let (asr, _asr_task) = silent_asr().await;
    let (app, registry) = app(vec![("office", endpoints(satellite, asr))]);

    let (status, accepted) = call(&app, "POST", "/devices/office/trigger", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let session_id = accepted["session_id"].as_str().unwrap().to_string();

    let (status, body) = call(&app, "POST", "/devices/office/trigger", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains(&session_id));

    let (_, devices) = call(&app, "GET", "/devices", None).await;
    assert_eq!(devices[0]["device_id"], "office");
    assert_eq!(devices[0]["busy"], true);

    let (status, body) = call(&app, "POST", &format!("/sessions/{}/cancel", session_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelling");

    let result = registry.wait(session_id.parse().unwrap()).await.unwrap();
    assert_eq!(result.outcome, Some(wyoming_trigger::SessionOutcome::Cancelled));

    let (status, body) = call(&app, "POST", &format!("/sessions/{}/cancel", session_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "finished");
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let (app, _registry) = app(Vec::new());
    let id = Uuid::new_v4();

    let (status, _) = call(&app, "GET", &format!("/sessions/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, "POST", &format!("/sessions/{}/cancel", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(&app, "GET", "/devices/kitchen/result", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
