//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the catalog API and run the
//! pacer, client, crawler and SQLite store together end-to-end.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tmdb_harvester::config::{ApiConfig, CrawlerConfig, FetchErrorPolicy, PacerConfig};
use tmdb_harvester::crawler::{
    build_http_client, CatalogClient, CatalogSource, Crawler, FetchOutcome, Pacer,
};
use tmdb_harvester::state::{Category, ScanState};
use tmdb_harvester::storage::{
    ErrorRecord, ProgressStore, SqliteStorage, StorageError, StorageResult,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Builds a paced client against the mock server
fn create_client(server: &MockServer, min_interval_ms: u64) -> Arc<CatalogClient> {
    let pacer_config = PacerConfig {
        min_interval_ms,
        request_timeout_secs: 1,
    };
    let http = build_http_client(&pacer_config).expect("Failed to build HTTP client");
    let pacer = Pacer::new(http, pacer_config.min_interval());

    let api = ApiConfig {
        base_url: server.uri(),
        access_token: "test-token".to_string(),
    };
    Arc::new(CatalogClient::new(pacer, &api))
}

/// Opens an on-disk store in a fresh temporary directory
fn create_store() -> (TempDir, Arc<Mutex<SqliteStorage>>) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let storage =
        SqliteStorage::new(&dir.path().join("harvest.db")).expect("Failed to open database");
    (dir, Arc::new(Mutex::new(storage)))
}

async fn mount_movie(server: &MockServer, id: u64, response: ResponseTemplate, times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/movie/{}", id)))
        .respond_with(response)
        .expect(times)
        .mount(server)
        .await;
}

fn movie_body(id: u64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": id, "title": format!("Movie {}", id)}))
}

#[tokio::test]
async fn test_found_not_found_error_then_resume() {
    let server = MockServer::start().await;
    mount_movie(&server, 1, movie_body(1), 1).await;
    mount_movie(&server, 2, ResponseTemplate::new(404), 1).await;
    // Outlives the 1s client timeout: a transport error
    mount_movie(
        &server,
        3,
        movie_body(3).set_delay(Duration::from_secs(3)),
        1,
    )
    .await;
    mount_movie(&server, 4, movie_body(4), 1).await;
    mount_movie(&server, 5, ResponseTemplate::new(404), 1).await;

    let (_dir, store) = create_store();
    let source: Arc<dyn CatalogSource> = create_client(&server, 5);
    let crawler = Crawler::new(
        Category::Movie,
        store.clone(),
        source,
        CrawlerConfig::default(),
    );

    let report = crawler
        .start(CancellationToken::new(), 0, 3, false)
        .await
        .expect("Scan failed");

    assert_eq!(report.final_state, ScanState::Completed);
    assert_eq!(report.cursor, 3);
    {
        let store = store.lock().unwrap();
        assert_eq!(store.get_progress(Category::Movie).unwrap(), 3);
        assert_eq!(store.count_records(Category::Movie).unwrap(), 1);
        assert!(store.record_exists(Category::Movie, 1).unwrap());
        assert_eq!(store.count_not_found(Category::Movie).unwrap(), 1);
        assert!(store.not_found_exists(Category::Movie, 2).unwrap());

        let errors = store.recent_errors(Category::Movie, 10).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].tmdb_id, 3);
    }

    // Resuming starts at 4; nothing at or below the cursor is requested again
    let report = crawler
        .start(CancellationToken::new(), 0, 5, false)
        .await
        .expect("Resumed scan failed");

    assert_eq!(report.first, 4);
    assert_eq!(report.fetched, 2);
    assert_eq!(report.cursor, 5);
}

#[tokio::test]
async fn test_hold_policy_retries_failed_identifier_on_resume() {
    let server = MockServer::start().await;
    mount_movie(&server, 1, ResponseTemplate::new(503), 2).await;
    mount_movie(&server, 2, movie_body(2), 1).await;

    let (_dir, store) = create_store();
    let config = CrawlerConfig {
        on_fetch_error: FetchErrorPolicy::Hold,
        ..CrawlerConfig::default()
    };
    let crawler = Crawler::new(Category::Movie, store.clone(), create_client(&server, 5), config);

    let report = crawler
        .start(CancellationToken::new(), 0, 2, false)
        .await
        .unwrap();
    assert_eq!(report.cursor, 0);
    assert_eq!(report.stored, 1);

    // 1 is fetched again, 2 is a cheap skip
    let report = crawler
        .start(CancellationToken::new(), 0, 2, false)
        .await
        .unwrap();
    assert_eq!(report.first, 1);
    assert_eq!(report.skipped_existing, 1);
    assert_eq!(store.lock().unwrap().count_errors(Category::Movie).unwrap(), 2);
}

#[tokio::test]
async fn test_stored_identifier_is_not_fetched_without_overwrite() {
    let server = MockServer::start().await;
    mount_movie(&server, 7, movie_body(7), 0).await;
    mount_movie(&server, 8, movie_body(8), 1).await;

    let (_dir, store) = create_store();
    store
        .lock()
        .unwrap()
        .store_record(Category::Movie, 7, r#"{"id":7}"#)
        .unwrap();

    let crawler = Crawler::new(
        Category::Movie,
        store.clone(),
        create_client(&server, 5),
        CrawlerConfig::default(),
    );
    let report = crawler
        .start(CancellationToken::new(), 7, 8, false)
        .await
        .unwrap();

    assert_eq!(report.skipped_existing, 1);
    assert_eq!(report.stored, 1);
    assert_eq!(report.cursor, 8);
}

#[tokio::test]
async fn test_confirmed_absent_is_not_fetched_even_with_overwrite() {
    let server = MockServer::start().await;
    mount_movie(&server, 7, movie_body(7), 1).await;
    mount_movie(&server, 8, movie_body(8), 0).await;

    let (_dir, store) = create_store();
    {
        let mut store = store.lock().unwrap();
        store.store_record(Category::Movie, 7, r#"{"id":7,"title":"stale"}"#).unwrap();
        store.insert_not_found(Category::Movie, 8).unwrap();
    }

    let crawler = Crawler::new(
        Category::Movie,
        store.clone(),
        create_client(&server, 5),
        CrawlerConfig::default(),
    );
    let report = crawler
        .start(CancellationToken::new(), 7, 8, true)
        .await
        .unwrap();

    assert_eq!(report.fetched, 1);
    assert_eq!(report.skipped_not_found, 1);

    let stored = store
        .lock()
        .unwrap()
        .get_record(Category::Movie, 7)
        .unwrap()
        .unwrap();
    assert!(stored.contains("Movie 7"));
}

/// Wraps a SQLite store and fails `store_record` for selected identifiers
struct FaultyStore {
    inner: SqliteStorage,
    fail_ids: HashSet<u64>,
}

impl ProgressStore for FaultyStore {
    fn get_progress(&self, category: Category) -> StorageResult<u64> {
        self.inner.get_progress(category)
    }

    fn update_progress(&mut self, category: Category, tmdb_id: u64) -> StorageResult<()> {
        self.inner.update_progress(category, tmdb_id)
    }

    fn record_exists(&self, category: Category, tmdb_id: u64) -> StorageResult<bool> {
        self.inner.record_exists(category, tmdb_id)
    }

    fn not_found_exists(&self, category: Category, tmdb_id: u64) -> StorageResult<bool> {
        self.inner.not_found_exists(category, tmdb_id)
    }

    fn store_record(&mut self, category: Category, tmdb_id: u64, payload: &str) -> StorageResult<()> {
        if self.fail_ids.contains(&tmdb_id) {
            return Err(StorageError::Database("disk I/O error".to_string()));
        }
        self.inner.store_record(category, tmdb_id, payload)
    }

    fn insert_not_found(&mut self, category: Category, tmdb_id: u64) -> StorageResult<()> {
        self.inner.insert_not_found(category, tmdb_id)
    }

    fn insert_error(&mut self, category: Category, tmdb_id: u64, message: &str) -> StorageResult<()> {
        self.inner.insert_error(category, tmdb_id, message)
    }

    fn count_records(&self, category: Category) -> StorageResult<u64> {
        self.inner.count_records(category)
    }

    fn count_not_found(&self, category: Category) -> StorageResult<u64> {
        self.inner.count_not_found(category)
    }

    fn count_errors(&self, category: Category) -> StorageResult<u64> {
        self.inner.count_errors(category)
    }

    fn recent_errors(&self, category: Category, limit: usize) -> StorageResult<Vec<ErrorRecord>> {
        self.inner.recent_errors(category, limit)
    }
}

#[tokio::test]
async fn test_persistence_failure_keeps_cursor_and_is_retried() {
    let server = MockServer::start().await;
    mount_movie(&server, 4, movie_body(4), 1).await;
    mount_movie(&server, 5, movie_body(5), 2).await;
    mount_movie(&server, 6, movie_body(6), 1).await;

    let store = Arc::new(Mutex::new(FaultyStore {
        inner: SqliteStorage::new_in_memory().unwrap(),
        fail_ids: HashSet::from([5]),
    }));
    store
        .lock()
        .unwrap()
        .update_progress(Category::Movie, 3)
        .unwrap();

    let crawler = Crawler::new(
        Category::Movie,
        store.clone(),
        create_client(&server, 5),
        CrawlerConfig::default(),
    );

    let report = crawler
        .start(CancellationToken::new(), 0, 6, false)
        .await
        .unwrap();

    assert_eq!(report.persistence_failures, 1);
    assert_eq!(report.cursor, 4);
    {
        let store = store.lock().unwrap();
        assert_eq!(store.get_progress(Category::Movie).unwrap(), 4);
        let errors = store.recent_errors(Category::Movie, 10).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].tmdb_id, 5);
        // Identifiers after the hole are still processed
        assert!(store.record_exists(Category::Movie, 6).unwrap());
    }

    store.lock().unwrap().fail_ids.clear();

    let report = crawler
        .start(CancellationToken::new(), 0, 6, false)
        .await
        .unwrap();

    assert_eq!(report.first, 5);
    assert_eq!(report.stored, 1);
    assert_eq!(report.skipped_existing, 1);
    assert_eq!(report.cursor, 6);
}

/// Echoes the requested id after a per-id latency and records arrival times
struct EchoResponder {
    arrivals: Arc<Mutex<Vec<Instant>>>,
}

impl Respond for EchoResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.arrivals.lock().unwrap().push(Instant::now());

        let id: u64 = request
            .url
            .path()
            .rsplit('/')
            .next()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        // Scrambled latencies so completions arrive out of order
        let latency = Duration::from_millis((id * 37 % 7) * 40);
        ResponseTemplate::new(200)
            .set_body_json(serde_json::json!({ "id": id }))
            .set_delay(latency)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pacer_spaces_dispatches_and_routes_results() {
    let server = MockServer::start().await;
    let arrivals = Arc::new(Mutex::new(Vec::new()));
    Mock::given(method("GET"))
        .respond_with(EchoResponder {
            arrivals: arrivals.clone(),
        })
        .mount(&server)
        .await;

    let interval_ms = 80;
    let client = create_client(&server, interval_ms);

    let mut handles = Vec::new();
    for id in 1..=8u64 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            (id, client.fetch(Category::Movie, id).await)
        }));
    }

    for handle in handles {
        let (id, outcome) = handle.await.unwrap();
        match outcome {
            FetchOutcome::Found(payload) => assert_eq!(payload["id"], id),
            other => panic!("unexpected outcome for {}: {:?}", id, other),
        }
    }

    let mut arrivals = arrivals.lock().unwrap().clone();
    arrivals.sort();
    assert_eq!(arrivals.len(), 8);

    let tolerance = Duration::from_millis(30);
    for pair in arrivals.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(
            gap + tolerance >= Duration::from_millis(interval_ms),
            "dispatches only {:?} apart",
            gap
        );
    }
}

#[tokio::test]
async fn test_cancelled_scan_leaves_consistent_cursor() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_delay(Duration::from_millis(20)))
        .mount(&server)
        .await;

    let (_dir, store) = create_store();
    let crawler = Arc::new(Crawler::new(
        Category::Show,
        store.clone(),
        create_client(&server, 5),
        CrawlerConfig::default(),
    ));

    let cancel = CancellationToken::new();
    let handle = {
        let crawler = crawler.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { crawler.start(cancel, 1, 100_000, false).await })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel.cancel();

    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.final_state, ScanState::Cancelled);
    assert!(report.cursor > 0 && report.cursor < 100_000);

    let store = store.lock().unwrap();
    assert_eq!(store.get_progress(Category::Show).unwrap(), report.cursor);
    assert_eq!(store.count_not_found(Category::Show).unwrap(), report.cursor);
}
