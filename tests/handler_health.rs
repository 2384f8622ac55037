mod common;

use admetric::api::handlers::health_handler;
use admetric::state::AppState;
use axum::{Router, routing::get};
use axum_test::TestServer;
use std::time::Duration;
use tempfile::TempDir;

fn server(pipeline: &common::TestPipeline) -> TestServer {
    let app = Router::new()
        .route("/health", get(health_handler))
        .with_state(AppState::from_pipeline(&pipeline.pipeline));

    TestServer::new(app).unwrap()
}

#[tokio::test]
async fn test_health_endpoint_success() {
    let tmp = TempDir::new().unwrap();
    let pipeline = common::start_pipeline(&["ad-1"], common::fast_settings(tmp.path()));
    let server = server(&pipeline);

    let response = server.get("/health").await;

    response.assert_status_ok();

    let json = response.json::<serde_json::Value>();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["checks"]["storage"]["status"], "ok");
    assert_eq!(json["checks"]["event_log"]["status"], "ok");
    assert_eq!(json["checks"]["backup_backlog"], 0);
}

#[tokio::test]
async fn test_health_endpoint_structure() {
    let tmp = TempDir::new().unwrap();
    let pipeline = common::start_pipeline(&[], common::fast_settings(tmp.path()));
    let server = server(&pipeline);

    let json = server.get("/health").await.json::<serde_json::Value>();

    assert!(json.get("status").is_some());
    assert!(json.get("version").is_some());
    assert!(json.get("checks").is_some());

    let breakers = json["checks"]["breakers"].as_array().unwrap();
    let names: Vec<&str> = breakers.iter().filter_map(|b| b["name"].as_str()).collect();
    assert_eq!(names, vec!["storage", "event-log"]);
    assert!(breakers.iter().all(|b| b["state"] == "closed"));
}

#[tokio::test]
async fn test_health_endpoint_storage_down() {
    let tmp = TempDir::new().unwrap();
    let pipeline = common::start_pipeline(&["ad-1"], common::fast_settings(tmp.path()));
    let server = server(&pipeline);

    pipeline.repo.set_down(true);

    let response = server.get("/health").await;

    assert_eq!(response.status_code(), 503);
    let json = response.json::<serde_json::Value>();
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["checks"]["storage"]["status"], "error");
    assert_eq!(json["checks"]["event_log"]["status"], "ok");

    pipeline.repo.set_down(false);
    tokio::time::sleep(Duration::from_millis(10)).await;
    server.get("/health").await.assert_status_ok();
}
