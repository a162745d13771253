// src/config/feed.rs
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ENV_PATH: &str = "FEED_CONFIG_PATH";

/// Geographic polling window, in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub west: f64,
    pub east: f64,
}

impl Default for BoundingBox {
    fn default() -> Self {
        // Santiago metropolitan region
        Self {
            north: -33.35,
            south: -33.45,
            west: -70.6,
            east: -70.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub endpoint: String,
    pub bbox: BoundingBox,
    /// Comma-separated feed sections to request.
    pub types: String,
    pub interval_secs: u64,
    /// Stop once the raw collection holds this many events. 0 = no limit.
    pub max_total_events: u64,
    pub request_timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://www.waze.com/live-map/api/georss".into(),
            bbox: BoundingBox::default(),
            types: "alerts,traffic,users".into(),
            interval_secs: 30,
            max_total_events: 10_000,
            request_timeout_secs: 20,
        }
    }
}

impl FeedConfig {
    pub fn load_default() -> Result<Self> {
        let cfg: Self = super::load_default(ENV_PATH, "feed")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let b = &self.bbox;
        if !(b.north > b.south) {
            bail!("bbox north ({}) must be greater than south ({})", b.north, b.south);
        }
        if !(b.east > b.west) {
            bail!("bbox east ({}) must be greater than west ({})", b.east, b.west);
        }
        if self.interval_secs == 0 {
            bail!("interval_secs must be at least 1");
        }
        Ok(())
    }

    /// Full georss request URL for the configured window.
    pub fn request_url(&self) -> String {
        let b = &self.bbox;
        format!(
            "{}?top={}&bottom={}&left={}&right={}&env=row&types={}",
            self.endpoint, b.north, b.south, b.west, b.east, self.types
        )
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
