mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;
use tower::ServiceExt;

use common::{pipeline, StubBackend};
use loop_over_rows::api;

fn app() -> Router {
    api::router(pipeline(StubBackend::fixed(r#"{"x":1}"#)))
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, JsonValue) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(&app(), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["modes"], json!(["freestyle", "contextual-scoring"]));
}

#[tokio::test]
async fn test_process_returns_results() {
    let body = json!({
        "request_id": "sync-1",
        "data": {"r1": ["a"], "r2": ["b"]},
        "headers": ["h"],
        "prompt": "p"
    });
    let (status, body) = send(&app(), post("/process", &body.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["request_id"], "sync-1");
    assert_eq!(body["mode"], "freestyle");
    assert_eq!(body["processed_count"], 2);
    assert_eq!(body["total_count"], 2);
    assert_eq!(body["results"], json!([{"row_key": "r1", "x": 1}, {"row_key": "r2", "x": 1}]));
}

#[tokio::test]
async fn test_validation_error_is_422() {
    let app = app();

    let (status, body) = send(&app, post("/process", r#"{"mode": "crawl"}"#)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("crawl"));

    let (status, body) = send(&app, post("/process", "{not json")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);

    let (status, _) = send(
        &app,
        post("/jobs", r#"{"data": {}, "headers": [], "prompt": "p"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_background_job_and_status() {
    let app = app();
    let body = json!({
        "request_id": "bg-1",
        "data": {"r1": ["a"]},
        "headers": ["h"],
        "prompt": "p"
    });
    let (status, accepted) = send(&app, post("/jobs", &body.to_string())).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(accepted, json!({"request_id": "bg-1", "status": "running"}));

    for _ in 0..100 {
        let (status, snapshot) = send(&app, get("/status/bg-1")).await;
        assert_eq!(status, StatusCode::OK);
        if snapshot["status"] == "completed" {
            assert_eq!(snapshot["progress"], 100);
            assert_eq!(snapshot["results"], json!([{"row_key": "r1", "x": 1}]));
            assert!(snapshot["completed_at"].is_string());
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("后台任务没有完成");
}

#[tokio::test]
async fn test_unknown_status() {
    let (status, body) = send(&app(), get("/status/nope")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "unknown"}));
}
