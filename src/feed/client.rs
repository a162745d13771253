// src/feed/client.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use reqwest::Client;
use serde_json::Value;

use super::FeedSource;
use crate::config::FeedConfig;

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const LIVE_MAP_REFERER: &str = "https://www.waze.com/live-map";

/// HTTP georss client for one bounding box.
pub struct GeoRssClient {
    client: Client,
    url: String,
}

impl GeoRssClient {
    pub fn new(cfg: &FeedConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
        headers.insert(REFERER, HeaderValue::from_static(LIVE_MAP_REFERER));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(cfg.request_timeout())
            .build()
            .context("building georss http client")?;
        Ok(Self {
            client,
            url: cfg.request_url(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FeedSource for GeoRssClient {
    async fn fetch_snapshot(&self) -> Result<Value> {
        let t0 = std::time::Instant::now();
        tracing::info!(url = %self.url, "requesting feed snapshot");

        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("georss request")?
            .error_for_status()
            .context("georss http status")?;
        let snapshot: Value = resp.json().await.context("decoding georss json")?;

        histogram!("feed_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("feed_fetches_total").increment(1);
        Ok(snapshot)
    }

    fn name(&self) -> &'static str {
        "georss"
    }
}

/// Feed backed by a captured JSON snapshot. No HTTP.
pub struct FixtureFeed {
    pub snapshot_json: String,
}

impl FixtureFeed {
    pub fn from_fixture(content: &str) -> Self {
        Self {
            snapshot_json: content.to_string(),
        }
    }
}

#[async_trait]
impl FeedSource for FixtureFeed {
    async fn fetch_snapshot(&self) -> Result<Value> {
        serde_json::from_str(&self.snapshot_json).context("parsing feed fixture")
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
