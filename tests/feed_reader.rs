// tests/feed_reader.rs
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use traffic_normalizer::config::FeedConfig;
use traffic_normalizer::feed::{poll_once, run_feed_reader, FeedSource, FixtureFeed};
use traffic_normalizer::{MemoryStore, Pipeline, PipelineConfig, RunOutcome};

const RAW: &str = "raw_events";

fn snapshot() -> String {
    json!({
        "alerts": [{
            "uuid": "a-1",
            "type": "HAZARD",
            "subtype": "HAZARD_ON_ROAD_POT_HOLE",
            "location": {"x": -70.58, "y": -33.42},
            "pubMillis": 1_700_000_000_000i64,
            "city": "Las Condes",
            "reliability": 6,
            "confidence": 1
        }],
        "jams": [{
            "uuid": "j-1",
            "level": 4,
            "speedKMH": 8.3,
            "delay": 210,
            "street": "Costanera Norte",
            "location": {"x": -70.57, "y": -33.41},
            "pubMillis": 1_700_000_100_000i64
        }],
        "users": [{
            "id": "user-1",
            "location": {"x": -70.55, "y": -33.40}
        }]
    })
    .to_string()
}

struct FailingFeed {
    calls: AtomicUsize,
}

#[async_trait]
impl FeedSource for FailingFeed {
    async fn fetch_snapshot(&self) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(anyhow!("upstream timeout"))
    }
    fn name(&self) -> &'static str {
        "failing"
    }
}

#[tokio::test]
async fn poll_once_tags_and_appends() {
    let store = MemoryStore::new();
    let feed = FixtureFeed::from_fixture(&snapshot());
    let now = Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap();

    let n = poll_once(&feed, &store, RAW, now).await.unwrap();
    assert_eq!(n, 3);

    let raw = store.documents(RAW);
    assert_eq!(raw[0]["source_category"], json!("alert"));
    assert_eq!(raw[1]["source_category"], json!("jam"));
    assert_eq!(raw[2]["source_category"], json!("user_location"));
    assert!(raw
        .iter()
        .all(|d| d["capture_timestamp"] == json!("2024-02-01T12:00:00.000000Z")));
    // verbatim: original fields untouched
    assert_eq!(raw[1]["speedKMH"], json!(8.3));
}

#[tokio::test]
async fn captured_feed_normalizes_end_to_end() {
    let store = MemoryStore::new();
    let feed = FixtureFeed::from_fixture(&snapshot());
    let now = Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap();
    poll_once(&feed, &store, RAW, now).await.unwrap();

    let cfg = PipelineConfig {
        startup_retry_count: 1,
        startup_retry_interval: 0,
        ..Default::default()
    };
    let summary = Pipeline::new(&cfg, &store).run().await;
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.accepted, 3);

    let out = store.documents(&cfg.output_collection);
    assert_eq!(out[0]["incident_category"], json!("HAZARD"));
    assert_eq!(out[0]["locality"], json!("Las Condes"));
    assert_eq!(out[1]["incident_subcategory"], json!("LEVEL_4"));
    assert_eq!(out[1]["delay_seconds"], json!(210));
    assert_eq!(out[1]["locality"], json!("UNKNOWN"));
    // users carry no pubMillis: event time comes from the capture time
    assert_eq!(out[2]["original_id"], json!("user-1"));
    assert_eq!(out[2]["event_timestamp"], json!("2024-02-01T12:00:00Z"));
    assert_eq!(out[2]["description"], json!("User position"));
}

#[tokio::test]
async fn fetch_errors_propagate_from_poll_once() {
    let store = MemoryStore::new();
    let feed = FailingFeed {
        calls: AtomicUsize::new(0),
    };
    assert!(poll_once(&feed, &store, RAW, Utc::now()).await.is_err());
    assert!(store.documents(RAW).is_empty());
}

#[tokio::test(start_paused = true)]
async fn reader_stops_at_event_limit() {
    let store = MemoryStore::new();
    let feed = FixtureFeed::from_fixture(&snapshot());
    let cfg = FeedConfig {
        interval_secs: 30,
        max_total_events: 5,
        ..Default::default()
    };

    let appended = run_feed_reader(&cfg, &feed, &store, RAW, std::future::pending::<()>()).await;

    // two polls of three events each cross the limit of five
    assert_eq!(appended, 6);
    assert_eq!(store.documents(RAW).len(), 6);
}

#[tokio::test(start_paused = true)]
async fn reader_counts_existing_events_toward_limit() {
    let existing = json!({"uuid": "old"}).as_object().cloned().unwrap();
    let store = MemoryStore::new().with_documents(RAW, vec![existing; 5]);
    let feed = FixtureFeed::from_fixture(&snapshot());
    let cfg = FeedConfig {
        max_total_events: 5,
        ..Default::default()
    };

    let appended = run_feed_reader(&cfg, &feed, &store, RAW, std::future::pending::<()>()).await;
    assert_eq!(appended, 0);
}

#[tokio::test(start_paused = true)]
async fn reader_survives_fetch_errors_until_interrupted() {
    let store = MemoryStore::new();
    let feed = FailingFeed {
        calls: AtomicUsize::new(0),
    };
    let cfg = FeedConfig {
        interval_secs: 30,
        max_total_events: 0,
        ..Default::default()
    };

    let appended = run_feed_reader(
        &cfg,
        &feed,
        &store,
        RAW,
        tokio::time::sleep(Duration::from_secs(75)),
    )
    .await;

    assert_eq!(appended, 0);
    // polls at t=0, 30 and 60 before the interrupt at 75
    assert_eq!(feed.calls.load(Ordering::SeqCst), 3);
}
