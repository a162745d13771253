// src/normalize/event.rs
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::store::Document;

pub const UNKNOWN_LOCALITY: &str = "UNKNOWN";

/// Fields only some categories carry. Values are copied verbatim from the feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CategoryExtras {
    Alert {
        confidence: Option<Value>,
        reliability: Option<Value>,
    },
    Jam {
        speed: Option<Value>,
        delay_seconds: Option<Value>,
    },
    None,
}

/// Normalized output record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HomogeneousEvent {
    pub original_id: String,
    pub source_category_original: Option<String>,
    pub longitude: f64,
    pub latitude: f64,
    #[serde(serialize_with = "rfc3339::serialize")]
    pub event_timestamp: DateTime<Utc>,
    #[serde(serialize_with = "rfc3339::option::serialize")]
    pub capture_timestamp: Option<DateTime<Utc>>,
    pub locality: String,
    pub incident_category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_subcategory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extras: CategoryExtras,
    pub weekday: Option<u32>,
    pub hour_of_day: Option<u32>,
}

impl HomogeneousEvent {
    /// Output-store representation. Timestamps are RFC 3339 in UTC.
    pub fn to_document(&self) -> Result<Document, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(serde::ser::Error::custom(format!(
                "event serialized to a non-object: {other}"
            ))),
        }
    }
}

mod rfc3339 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::Serializer;

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::Serializer;

        pub fn serialize<S: Serializer>(
            ts: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => super::serialize(ts, s),
                None => s.serialize_none(),
            }
        }
    }
}
