// src/normalize/timestamp.rs
//! Event-time derivation.
//!
//! Strategies are tried in order and the first one yielding an instant wins.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::warn;

use super::raw::RawEvent;

/// Where an event timestamp came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampSource {
    PubMillis,
    Capture,
}

impl TimestampSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PubMillis => "pub_millis",
            Self::Capture => "capture",
        }
    }
}

type Strategy = fn(&RawEvent) -> Option<DateTime<Utc>>;

const EVENT_TIME_STRATEGIES: &[(TimestampSource, Strategy)] = &[
    (TimestampSource::PubMillis, from_pub_millis),
    (TimestampSource::Capture, from_capture),
];

pub fn derive_event_time(raw: &RawEvent) -> Option<(DateTime<Utc>, TimestampSource)> {
    EVENT_TIME_STRATEGIES
        .iter()
        .find_map(|(source, strategy)| strategy(raw).map(|ts| (ts, *source)))
}

fn from_pub_millis(raw: &RawEvent) -> Option<DateTime<Utc>> {
    let value = raw.common.pub_millis.as_ref()?;
    let ts = epoch_millis(value);
    if ts.is_none() {
        warn!(pub_millis = %value, "invalid pubMillis; falling back to capture timestamp");
    }
    ts
}

fn from_capture(raw: &RawEvent) -> Option<DateTime<Utc>> {
    match raw.common.capture_timestamp.as_ref()? {
        Value::String(s) => parse_capture_timestamp(s),
        _ => None,
    }
}

/// Epoch milliseconds (integer or float JSON number) to a UTC instant.
pub fn epoch_millis(value: &Value) -> Option<DateTime<Utc>> {
    let Value::Number(n) = value else {
        return None;
    };
    if let Some(ms) = n.as_i64() {
        return DateTime::from_timestamp_millis(ms);
    }
    let ms = n.as_f64()?;
    let micros = (ms * 1_000.0).round();
    if !micros.is_finite() || micros.abs() >= i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp_micros(micros as i64)
}

/// ISO-8601 capture time. A trailing `Z` means UTC; timestamps without an
/// offset are taken as UTC.
pub fn parse_capture_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let normalized = match s.strip_suffix(['Z', 'z']) {
        Some(head) => format!("{head}+00:00"),
        None => s.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
