// src/feed/mod.rs
//! Feed reader: polls a georss endpoint and appends every returned record,
//! unvalidated, to the raw collection.

pub mod client;

use std::future::Future;

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::FeedConfig;
use crate::normalize::raw::{ALERT, CAPTURE_FIELD, CATEGORY_FIELD, JAM, USER_LOCATION};
use crate::store::{best_effort_count, Document, DocumentStore, StoreError};
pub use client::{FixtureFeed, GeoRssClient};

/// Snapshot section → category tag written on each record.
const SECTIONS: &[(&str, &str)] = &[("alerts", ALERT), ("jams", JAM), ("users", USER_LOCATION)];

#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<Value>;
    fn name(&self) -> &'static str;
}

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("feed_fetches_total", "Successful feed snapshot fetches.");
        describe_counter!("feed_fetch_errors_total", "Feed fetch/decode errors.");
        describe_counter!(
            "feed_events_captured_total",
            "Raw events appended to the raw collection."
        );
        describe_histogram!("feed_fetch_ms", "Feed fetch time in milliseconds.");
    });
}

/// Capture-time format written on raw records, e.g. `2024-01-01T12:00:00.123456Z`.
pub fn format_capture_time(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Flatten a snapshot into raw documents tagged with category and capture time.
/// Entries that are not JSON objects are skipped.
pub fn tag_snapshot(snapshot: &Value, captured_at: DateTime<Utc>) -> Vec<Document> {
    let capture = format_capture_time(captured_at);
    let mut out = Vec::new();
    for (section, category) in SECTIONS {
        let Some(items) = snapshot.get(*section).and_then(Value::as_array) else {
            continue;
        };
        for item in items {
            let Value::Object(fields) = item else {
                warn!(section, "skipping non-object feed entry");
                continue;
            };
            let mut doc = fields.clone();
            doc.insert(CAPTURE_FIELD.into(), Value::String(capture.clone()));
            doc.insert(CATEGORY_FIELD.into(), Value::String((*category).to_string()));
            out.push(doc);
        }
    }
    out
}

/// Fetch one snapshot and append it to `collection`. Returns how many records landed.
pub async fn poll_once<S: DocumentStore + ?Sized>(
    source: &dyn FeedSource,
    store: &S,
    collection: &str,
    now: DateTime<Utc>,
) -> Result<u64> {
    ensure_metrics_described();
    let snapshot = match source.fetch_snapshot().await {
        Ok(s) => s,
        Err(e) => {
            counter!("feed_fetch_errors_total").increment(1);
            return Err(e);
        }
    };

    let docs = tag_snapshot(&snapshot, now);
    if docs.is_empty() {
        info!(source = source.name(), "no events in this snapshot");
        return Ok(0);
    }

    info!(source = source.name(), events = docs.len(), collection, "storing raw events");
    let inserted = match store.bulk_insert_unordered(collection, docs).await {
        Ok(n) => n,
        Err(StoreError::BulkWrite {
            inserted,
            failed,
            message,
        }) => {
            error!(inserted, failed, %message, "raw events partially stored");
            inserted
        }
        Err(e) => return Err(e.into()),
    };
    counter!("feed_events_captured_total").increment(inserted);
    Ok(inserted)
}

/// Poll every `interval_secs` until `max_total_events` raw events exist or
/// `shutdown` resolves. Fetch and store errors are logged and the loop goes on.
/// Returns the number of events appended by this call.
pub async fn run_feed_reader<S, F>(
    cfg: &FeedConfig,
    source: &dyn FeedSource,
    store: &S,
    collection: &str,
    shutdown: F,
) -> u64
where
    S: DocumentStore + ?Sized,
    F: Future<Output = ()>,
{
    let limit = cfg.max_total_events;
    let mut total = best_effort_count(store, collection).await.unwrap_or(0);
    info!(collection, existing = total, "feed reader starting");
    let mut appended = 0u64;

    tokio::pin!(shutdown);
    loop {
        if limit > 0 && total >= limit {
            info!(limit, total, "event limit reached; stopping feed reader");
            break;
        }

        let polled = tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("feed reader stopped by interrupt");
                break;
            }
            res = poll_once(source, store, collection, Utc::now()) => res,
        };
        match polled {
            Ok(n) => {
                total += n;
                appended += n;
                info!(total, limit, "raw events accumulated");
            }
            Err(e) => warn!(error = ?e, "no feed data this round"),
        }

        if limit > 0 && total >= limit {
            continue;
        }
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("feed reader stopped by interrupt");
                break;
            }
            _ = tokio::time::sleep(cfg.interval()) => {}
        }
    }

    match best_effort_count(store, collection).await {
        Some(n) => info!(collection, count = n, "feed reader finished"),
        None => info!(collection, "feed reader finished; final count unknown"),
    }
    appended
}
