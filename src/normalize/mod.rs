// src/normalize/mod.rs
//! Record validator/transformer: one raw feed document in, one normalized
//! event or a discard decision out. Malformed input never raises.

pub mod coerce;
pub mod event;
pub mod raw;
pub mod timestamp;

use chrono::{Datelike, Timelike};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::store::Document;
use coerce::{float, identifier, non_empty_text, present, text};
pub use event::{CategoryExtras, HomogeneousEvent, UNKNOWN_LOCALITY};
pub use raw::{RawEvent, RawKind};
use timestamp::{derive_event_time, parse_capture_timestamp};

/// Why a raw record was left out of the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DiscardReason {
    MissingId,
    MissingCoordinates,
    NonNumericCoordinates,
    NoEventTimestamp,
}

impl DiscardReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingId => "missing_id",
            Self::MissingCoordinates => "missing_coordinates",
            Self::NonNumericCoordinates => "non_numeric_coordinates",
            Self::NoEventTimestamp => "no_event_timestamp",
        }
    }
}

impl std::fmt::Display for DiscardReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convenience wrapper for callers holding a raw store document.
pub fn transform_document(doc: &Document) -> Result<HomogeneousEvent, DiscardReason> {
    transform(&RawEvent::from_document(doc))
}

/// `Some` for records passing every gate, `None` otherwise.
pub fn normalize_document(doc: &Document) -> Option<HomogeneousEvent> {
    transform_document(doc).ok()
}

pub fn transform(raw: &RawEvent) -> Result<HomogeneousEvent, DiscardReason> {
    let category = raw.common.category_tag.as_deref();

    // 1) Identity
    let original_id = identifier(raw.common.uuid.as_ref())
        .or_else(|| match &raw.kind {
            RawKind::UserLocation(u) => identifier(u.id.as_ref()),
            _ => None,
        })
        .ok_or_else(|| {
            debug!(category, "discarded: missing uuid/id");
            DiscardReason::MissingId
        })?;

    // 2) Geometry
    let (longitude, latitude) = coordinates(raw.common.location.as_ref()).map_err(|reason| {
        debug!(id = %original_id, %reason, "discarded: bad location");
        reason
    })?;

    // 3) Event time
    let Some((event_timestamp, source)) = derive_event_time(raw) else {
        match &raw.common.capture_timestamp {
            Some(capture) => error!(
                id = %original_id,
                capture = %capture,
                "discarded: capture timestamp unusable and no valid pubMillis"
            ),
            None => debug!(
                id = %original_id,
                "discarded: no valid pubMillis and no capture timestamp"
            ),
        }
        return Err(DiscardReason::NoEventTimestamp);
    };
    debug!(id = %original_id, source = source.as_str(), "event time derived");

    let capture_timestamp = match &raw.common.capture_timestamp {
        Some(Value::String(s)) => {
            let parsed = parse_capture_timestamp(s);
            if parsed.is_none() {
                error!(id = %original_id, capture = %s, "capture timestamp unparseable");
            }
            parsed
        }
        Some(other) => {
            error!(id = %original_id, capture = %other, "capture timestamp is not a string");
            None
        }
        None => {
            warn!(id = %original_id, "capture timestamp missing");
            None
        }
    };

    let mut ev = HomogeneousEvent {
        original_id,
        source_category_original: raw.common.category_tag.clone(),
        longitude,
        latitude,
        event_timestamp,
        capture_timestamp,
        locality: locality(raw.common.city.as_ref()),
        incident_category: "UNKNOWN".into(),
        incident_subcategory: None,
        description: None,
        extras: CategoryExtras::None,
        weekday: Some(event_timestamp.weekday().num_days_from_monday()),
        hour_of_day: Some(event_timestamp.hour()),
    };

    // 4) Category-specific mapping
    match &raw.kind {
        RawKind::Alert(a) => {
            ev.incident_category = text(a.kind.as_ref())
                .map(|s| s.to_uppercase())
                .unwrap_or_else(|| "UNKNOWN".into());
            ev.incident_subcategory = Some(
                text(a.subtype.as_ref())
                    .map(|s| s.to_uppercase())
                    .unwrap_or_else(|| "N/A".into()),
            );
            ev.description = Some(
                non_empty_text(a.street.as_ref())
                    .or_else(|| text(a.report_description.as_ref()))
                    .unwrap_or_else(|| "N/A".into()),
            );
            ev.extras = CategoryExtras::Alert {
                confidence: a.confidence.clone(),
                reliability: a.reliability.clone(),
            };
        }
        RawKind::Jam(j) => {
            ev.incident_category = "CONGESTION".into();
            ev.incident_subcategory = Some(format!(
                "LEVEL_{}",
                text(j.level.as_ref()).unwrap_or_else(|| "N/A".into())
            ));
            ev.description = Some(text(j.street.as_ref()).unwrap_or_else(|| "N/A".into()));
            ev.extras = CategoryExtras::Jam {
                speed: j.speed_kmh.clone(),
                delay_seconds: j.delay_seconds.clone().or_else(|| j.delay.clone()),
            };
        }
        RawKind::UserLocation(_) => {
            ev.incident_category = "USER_POSITION".into();
            ev.incident_subcategory = Some("N/A".into());
            ev.description = Some("User position".into());
        }
        RawKind::Unknown => {
            warn!(id = %ev.original_id, category, "unknown source category");
        }
    }

    Ok(ev)
}

fn coordinates(location: Option<&Value>) -> Result<(f64, f64), DiscardReason> {
    let Some(Value::Object(loc)) = location else {
        return Err(DiscardReason::MissingCoordinates);
    };
    let (Some(x), Some(y)) = (loc.get("x"), loc.get("y")) else {
        return Err(DiscardReason::MissingCoordinates);
    };
    match (float(x), float(y)) {
        (Some(lon), Some(lat)) => Ok((lon, lat)),
        _ => Err(DiscardReason::NonNumericCoordinates),
    }
}

fn locality(city: Option<&Value>) -> String {
    match present(city) {
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("n/a") {
                UNKNOWN_LOCALITY.to_string()
            } else {
                trimmed.to_string()
            }
        }
        _ => UNKNOWN_LOCALITY.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn locality_sentinel_rules() {
        assert_eq!(locality(None), UNKNOWN_LOCALITY);
        assert_eq!(locality(Some(&json!("   "))), UNKNOWN_LOCALITY);
        assert_eq!(locality(Some(&json!(" n/A "))), UNKNOWN_LOCALITY);
        assert_eq!(locality(Some(&json!(42))), UNKNOWN_LOCALITY);
        assert_eq!(locality(Some(&json!("  Santiago "))), "Santiago");
    }

    #[test]
    fn null_coordinate_is_non_numeric() {
        assert_eq!(
            coordinates(Some(&json!({"x": null, "y": 1.0}))),
            Err(DiscardReason::NonNumericCoordinates)
        );
        assert_eq!(
            coordinates(Some(&json!({"x": 1.0}))),
            Err(DiscardReason::MissingCoordinates)
        );
        assert_eq!(
            coordinates(Some(&json!([1.0, 2.0]))),
            Err(DiscardReason::MissingCoordinates)
        );
    }

    #[test]
    fn derived_time_fields_follow_event_time() {
        // 2023-11-14 is a Tuesday
        let ev = transform_document(&doc(json!({
            "source_category": "alert",
            "uuid": "a-1",
            "location": {"x": -70.6, "y": -33.4},
            "pubMillis": 1_700_000_000_000i64,
            "capture_timestamp": "2024-01-01T00:00:00Z"
        })))
        .unwrap();
        assert_eq!(ev.weekday, Some(1));
        assert_eq!(ev.hour_of_day, Some(22));
    }
}
