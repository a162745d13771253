// src/config/pipeline.rs
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

const ENV_PATH: &str = "PIPELINE_CONFIG_PATH";
const ENV_STORE_ADDRESS: &str = "PIPELINE_STORE_ADDRESS";

/// Store location and batching knobs shared by the pipeline and the feed reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// sqlx SQLite URL, e.g. `sqlite://data/traffic.db`
    pub store_address: String,
    pub database_name: String,
    pub raw_collection: String,
    pub output_collection: String,
    /// Used both for cursor chunking and write buffering.
    pub batch_size: usize,
    pub startup_retry_count: u32,
    /// Seconds between readiness probes.
    pub startup_retry_interval: u64,
    /// Prometheus listener; metrics are only recorded in-process when unset.
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store_address: "sqlite://data/traffic.db".into(),
            database_name: "waze_db".into(),
            raw_collection: "raw_events".into(),
            output_collection: "homogeneous_events".into(),
            batch_size: 1000,
            startup_retry_count: 10,
            startup_retry_interval: 5,
            metrics_addr: None,
        }
    }
}

impl PipelineConfig {
    /// Resolve from file/env, apply `PIPELINE_STORE_ADDRESS`, then validate.
    pub fn load_default() -> Result<Self> {
        let mut cfg: Self = super::load_default(ENV_PATH, "pipeline")?;
        if let Ok(addr) = std::env::var(ENV_STORE_ADDRESS) {
            if !addr.trim().is_empty() {
                cfg.store_address = addr.trim().to_string();
            }
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.startup_retry_count == 0 {
            bail!("startup_retry_count must be at least 1");
        }
        if self.store_address.trim().is_empty() {
            bail!("store_address is empty");
        }
        if self.raw_collection.trim().is_empty() || self.output_collection.trim().is_empty() {
            bail!("collection names must not be empty");
        }
        if self.raw_collection == self.output_collection {
            bail!("raw and output collections must differ");
        }
        Ok(())
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.startup_retry_interval)
    }
}
