//! Integration tests for the HTTP control surface
//!
//! The router is driven in-process with `tower::ServiceExt::oneshot`; the
//! catalog API is a wiremock server.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tmdb_harvester::config::parse_config;
use tmdb_harvester::server::router;
use tmdb_harvester::storage::SqliteStorage;
use tmdb_harvester::{JobKind, ScrapeManager};
use tower::ServiceExt;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A running harness: keeps the temp dir and mock server alive
struct Harness {
    _dir: TempDir,
    _server: MockServer,
    manager: Arc<ScrapeManager>,
    app: Router,
}

async fn create_harness() -> Harness {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_delay(Duration::from_millis(20)))
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = dir.path().join("harvest.db");

    let config = parse_config(&format!(
        r#"
        [api]
        base-url = "{}"
        access-token = "test-token"

        [pacer]
        min-interval-ms = 5

        [storage]
        database-path = "{}"

        [imdb]
        dataset-url = "{}/title.ratings.tsv.gz"
        data-dir = "{}"
        "#,
        server.uri(),
        db_path.display(),
        server.uri(),
        dir.path().join("data").display()
    ))
    .expect("Failed to parse config");

    let storage = SqliteStorage::new(&db_path).expect("Failed to open database");
    let store = Arc::new(Mutex::new(storage));
    let manager =
        Arc::new(ScrapeManager::from_config(&config, store).expect("Failed to build manager"));
    let app = router(manager.clone());

    Harness {
        _dir: dir,
        _server: server,
        manager,
        app,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8_lossy(&body).to_string())
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_stats_reports_idle_jobs() {
    let harness = create_harness().await;

    let (status, body) = send(&harness.app, get("/stats")).await;

    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["movie_crawling"], false);
    assert_eq!(json["show_crawling"], false);
    assert_eq!(json["imdb_working"], false);
    assert_eq!(json["movie_progress"], 0);
    assert_eq!(json["show_progress"], 0);
    assert!(json.get("last_movie_crawler_time").is_none());
}

#[tokio::test]
async fn test_start_rejects_unknown_type() {
    let harness = create_harness().await;

    let (status, body) = send(
        &harness.app,
        post("/start", r#"{"type": "tv", "start": 0, "end": 0, "overwrite": false}"#),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Invalid type");
}

#[tokio::test]
async fn test_second_start_conflicts() {
    let harness = create_harness().await;
    let body = r#"{"type": "movie", "start": 1, "end": 100000, "overwrite": false}"#;

    let (status, text) = send(&harness.app, post("/start", body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "Process started successfully");

    let (status, _) = send(&harness.app, post("/start", body)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, stats) = send(&harness.app, get("/stats")).await;
    let json: serde_json::Value = serde_json::from_str(&stats).unwrap();
    assert_eq!(json["movie_crawling"], true);
    assert!(json["last_movie_crawler_time"].is_string());

    harness.manager.shut_down();
    assert!(harness.manager.wait_idle(Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_stop_halts_running_scan() {
    let harness = create_harness().await;

    let (status, _) = send(
        &harness.app,
        post("/start", r#"{"type": "show", "start": 0, "end": 100000, "overwrite": false}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(200)).await;

    let (status, text) = send(&harness.app, post("/stop", r#"{"type": "show"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "Process stopped successfully");

    assert!(harness.manager.wait_idle(Duration::from_secs(5)).await);
    assert!(!harness.manager.is_running(JobKind::Show));

    let (_, stats) = send(&harness.app, get("/stats")).await;
    let json: serde_json::Value = serde_json::from_str(&stats).unwrap();
    assert_eq!(json["show_crawling"], false);
    let progress = json["show_progress"].as_u64().unwrap();
    assert!(progress > 0 && progress < 100_000);
}

#[tokio::test]
async fn test_stop_is_idempotent_and_validates_type() {
    let harness = create_harness().await;

    let (status, _) = send(&harness.app, post("/stop", r#"{"type": "imdb"}"#)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&harness.app, post("/stop", r#"{"type": "everything"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Invalid type");
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let harness = create_harness().await;

    let (status, _) = send(&harness.app, post("/start", "not json")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}
