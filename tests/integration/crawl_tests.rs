//! Integration tests for the crawl pipeline
//!
//! These tests use wiremock to serve target pages and a temporary SQLite
//! database to run whole batches end-to-end: selection, crawling,
//! recording, run finalization, and ranking.

use chrono::NaiveDate;
use podrank::config::{load_config, Config};
use podrank::crawler::CrawlService;
use podrank::storage::{RunStatus, Storage};
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Writes a config pointing at the mock server and loads it through the normal path
fn create_test_config(base_url: &str, db_path: &Path, batch: &str) -> Config {
    let content = format!(
        r#"
[source]
page-url = "{base_url}/podcast/{{id}}"
request-timeout-secs = 5

[limiter]
max-requests = 100
time-window-secs = 60

[pacing]
min-delay-ms = 0
max-delay-ms = 0
base-delay-ms = 0

[retry]
max-attempts = 2
initial-delay-ms = 10
max-delay-ms = 50
backoff-factor = 2.0
jitter = false

[identity]
strategy = "round-robin"

[batch]
max-concurrency = 3
{batch}

[output]
database-path = "{db}"

[[target]]
external-id = "alpha"
name = "Alpha Hour"
category = "news"

[[target]]
external-id = "bravo"
name = "Bravo Talk"
category = "news"

[[target]]
external-id = "charlie"
name = "Charlie Laughs"
category = "comedy"

[[target]]
external-id = "delta"
name = "Delta Notes"

[[target]]
external-id = "echo"
name = "Echo Gone"
category = "comedy"
"#,
        base_url = base_url,
        batch = batch,
        db = db_path.display().to_string().replace('\\', "/"),
    );

    let config_path = db_path.with_extension("toml");
    std::fs::write(&config_path, content).expect("Failed to write config");
    load_config(&config_path).expect("Failed to load config")
}

fn page(count: &str) -> String {
    format!(
        "<html><head><title>Show</title></head><body><div class=\"stats\">{}</div></body></html>",
        count
    )
}

async fn mount_page(server: &MockServer, external_id: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(format!("/podcast/{}", external_id)))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

/// Serves counts for alpha, bravo, charlie; delta has no count; echo is missing
async fn mount_population(server: &MockServer) {
    mount_page(server, "alpha", page("250,000已订阅")).await;
    mount_page(server, "bravo", page("480000 已订阅")).await;
    mount_page(server, "charlie", page("250000已订阅")).await;
    mount_page(server, "delta", page("no counter here")).await;
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

#[tokio::test]
async fn test_full_batch_records_and_ranks() {
    let server = MockServer::start().await;
    mount_population(&server).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("podrank.db");
    let config = create_test_config(&server.uri(), &db_path, "partitions = 1");

    let service = CrawlService::from_config(config).expect("Failed to build service");
    let run = service
        .run_cycle(service.selector(day(), 0), 3)
        .await
        .expect("Run failed");

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.total_targets, 5);
    assert_eq!(run.success_count, 3);
    assert_eq!(run.failure_count, 2);
    assert!(run.completed_at.is_some());
    assert_eq!(run.error_message, None);

    let summary = service.compute_ranks(day()).expect("Ranking failed");
    assert_eq!(summary.ranked, 3);
    assert_eq!(summary.categories, 2);

    let storage = service.storage().lock().unwrap();
    let snapshot = |external_id: &str| {
        let target = storage
            .get_target_by_external_id(external_id)
            .unwrap()
            .unwrap();
        storage.get_snapshot(target.id, day()).unwrap()
    };

    let bravo = snapshot("bravo").unwrap();
    assert_eq!(bravo.subscriber_count, 480_000);
    assert_eq!(bravo.global_rank, Some(1));
    assert_eq!(bravo.category_rank, Some(1));

    // alpha and charlie tie; alpha sorts first by external id
    let alpha = snapshot("alpha").unwrap();
    assert_eq!(alpha.subscriber_count, 250_000);
    assert_eq!(alpha.global_rank, Some(2));
    assert_eq!(alpha.category_rank, Some(2));

    let charlie = snapshot("charlie").unwrap();
    assert_eq!(charlie.global_rank, Some(3));
    assert_eq!(charlie.category_rank, Some(1));

    assert!(snapshot("delta").is_none());
    assert!(snapshot("echo").is_none());
}

#[tokio::test]
async fn test_rerun_same_day_overwrites_snapshots() {
    let server = MockServer::start().await;
    mount_population(&server).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("podrank.db");
    let config = create_test_config(&server.uri(), &db_path, "partitions = 1");
    let service = CrawlService::from_config(config).unwrap();

    service.run_cycle(service.selector(day(), 0), 3).await.unwrap();
    service.compute_ranks(day()).unwrap();
    let second = service.run_cycle(service.selector(day(), 0), 3).await.unwrap();

    assert_eq!(second.status, RunStatus::Completed);

    let storage = service.storage().lock().unwrap();
    assert_eq!(storage.count_snapshots(day()).unwrap(), 3);
    assert_eq!(storage.recent_runs(10).unwrap().len(), 2);

    // Re-recorded snapshots drop their stale ranks until the next rank pass
    let bravo = storage.get_target_by_external_id("bravo").unwrap().unwrap();
    let snapshot = storage.get_snapshot(bravo.id, day()).unwrap().unwrap();
    assert_eq!(snapshot.global_rank, None);
}

#[tokio::test]
async fn test_time_sliced_windows_cover_population_once() {
    let server = MockServer::start().await;
    mount_population(&server).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("podrank.db");
    let config = create_test_config(&server.uri(), &db_path, "partitions = 2");
    let service = CrawlService::from_config(config).unwrap();

    let first = service.run_cycle(service.selector(day(), 0), 3).await.unwrap();
    let second = service.run_cycle(service.selector(day(), 1), 3).await.unwrap();

    assert_eq!(first.total_targets, 3);
    assert_eq!(second.total_targets, 2);
    assert_eq!(first.success_count + second.success_count, 3);

    let out_of_range = service.run_cycle(service.selector(day(), 2), 3).await;
    assert!(out_of_range.is_err());
}

#[tokio::test]
async fn test_cycle_strategy_with_single_day_cycle() {
    let server = MockServer::start().await;
    mount_population(&server).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("podrank.db");
    let config = create_test_config(
        &server.uri(),
        &db_path,
        "strategy = \"cycle\"\ncycle-length = 1\nbatch-size = 2",
    );
    let service = CrawlService::from_config(config).unwrap();

    let run = service.run_cycle(service.selector(day(), 0), 3).await.unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.total_targets, 2);
}

#[tokio::test]
async fn test_refresh_metadata_updates_targets() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "alpha",
        r#"<html><head>
            <meta property="og:title" content="Alpha Hour Daily">
            <meta property="og:image" content="https://cdn.example.com/alpha.jpg">
            <meta name="description" content="News every morning">
            <link rel="alternate" type="application/rss+xml" href="https://feeds.example.com/alpha.xml">
        </head><body>250000已订阅</body></html>"#
            .to_string(),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("podrank.db");
    let config = create_test_config(&server.uri(), &db_path, "partitions = 1");
    let service = CrawlService::from_config(config).unwrap();

    let summary = service.refresh_metadata(Some(1)).await.unwrap();
    assert_eq!(summary.attempted, 1);
    assert_eq!(summary.updated, 1);

    let storage = service.storage().lock().unwrap();
    let alpha = storage.get_target_by_external_id("alpha").unwrap().unwrap();
    assert_eq!(alpha.metadata.title.as_deref(), Some("Alpha Hour Daily"));
    assert_eq!(
        alpha.metadata.feed_url.as_deref(),
        Some("https://feeds.example.com/alpha.xml")
    );
    assert_eq!(
        alpha.metadata.cover_url.as_deref(),
        Some("https://cdn.example.com/alpha.jpg")
    );
    assert_eq!(
        alpha.metadata.description.as_deref(),
        Some("News every morning")
    );
}

#[tokio::test]
async fn test_service_reopens_existing_database() {
    let server = MockServer::start().await;
    mount_population(&server).await;

    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("podrank.db");

    {
        let config = create_test_config(&server.uri(), &db_path, "partitions = 1");
        let service = CrawlService::from_config(config).unwrap();
        service.run_cycle(service.selector(day(), 0), 3).await.unwrap();
    }

    let config = create_test_config(&server.uri(), &db_path, "partitions = 1");
    let service = CrawlService::from_config(config).unwrap();

    let storage = service.storage().lock().unwrap();
    assert_eq!(storage.count_targets().unwrap(), 5);
    assert_eq!(storage.latest_snapshot_date().unwrap(), Some(day()));
}
