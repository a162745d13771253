// src/normalize/raw.rs
//! Typed view over a raw feed document.
//!
//! The raw store is verbatim, so nothing here can fail: every field is kept as
//! an optional JSON value and judged later by the transformer.

use serde_json::Value;

use super::coerce::present;
use crate::store::Document;

pub const CATEGORY_FIELD: &str = "source_category";
pub const LEGACY_CATEGORY_FIELD: &str = "evento_tipo_waze";
pub const CAPTURE_FIELD: &str = "capture_timestamp";
pub const LEGACY_CAPTURE_FIELD: &str = "timestamp_scrape";

pub const ALERT: &str = "alert";
pub const JAM: &str = "jam";
pub const USER_LOCATION: &str = "user_location";

/// Fields every category may carry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommonFields {
    pub category_tag: Option<String>,
    pub uuid: Option<Value>,
    pub location: Option<Value>,
    pub pub_millis: Option<Value>,
    pub capture_timestamp: Option<Value>,
    pub city: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertFields {
    pub kind: Option<Value>,
    pub subtype: Option<Value>,
    pub street: Option<Value>,
    pub report_description: Option<Value>,
    pub confidence: Option<Value>,
    pub reliability: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JamFields {
    pub level: Option<Value>,
    pub street: Option<Value>,
    pub speed_kmh: Option<Value>,
    pub delay_seconds: Option<Value>,
    pub delay: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserLocationFields {
    pub id: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawKind {
    Alert(AlertFields),
    Jam(JamFields),
    UserLocation(UserLocationFields),
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub common: CommonFields,
    pub kind: RawKind,
}

impl RawEvent {
    pub fn from_document(doc: &Document) -> Self {
        let field = |name: &str| present(doc.get(name)).cloned();
        let either = |primary: &str, legacy: &str| field(primary).or_else(|| field(legacy));

        let category_tag = either(CATEGORY_FIELD, LEGACY_CATEGORY_FIELD).map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        });

        let kind = match category_tag.as_deref() {
            // "alerta" is what older feed captures wrote.
            Some(ALERT) | Some("alerta") => RawKind::Alert(AlertFields {
                kind: field("type"),
                subtype: field("subtype"),
                street: field("street"),
                report_description: field("reportDescription"),
                confidence: field("confidence"),
                reliability: field("reliability"),
            }),
            Some(JAM) => RawKind::Jam(JamFields {
                level: field("level"),
                street: field("street"),
                speed_kmh: field("speedKMH"),
                delay_seconds: field("delaySeconds"),
                delay: field("delay"),
            }),
            Some(USER_LOCATION) => RawKind::UserLocation(UserLocationFields { id: field("id") }),
            _ => RawKind::Unknown,
        };

        let common = CommonFields {
            category_tag,
            uuid: field("uuid"),
            location: field("location"),
            pub_millis: field("pubMillis"),
            capture_timestamp: either(CAPTURE_FIELD, LEGACY_CAPTURE_FIELD),
            city: field("city"),
        };

        Self { common, kind }
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
    fn legacy_field_names_are_understood() {
        let raw = RawEvent::from_document(&doc(json!({
            "evento_tipo_waze": "alerta",
            "timestamp_scrape": "2024-01-01T00:00:00Z",
            "type": "ACCIDENT"
        })));
        assert_eq!(raw.common.category_tag.as_deref(), Some("alerta"));
        assert_eq!(raw.common.capture_timestamp, Some(json!("2024-01-01T00:00:00Z")));
        assert!(matches!(raw.kind, RawKind::Alert(ref a) if a.kind == Some(json!("ACCIDENT"))));
    }

    #[test]
    fn nulls_are_dropped_and_unknown_tags_kept() {
        let raw = RawEvent::from_document(&doc(json!({
            "source_category": "hazard",
            "uuid": null,
            "city": null
        })));
        assert_eq!(raw.kind, RawKind::Unknown);
        assert_eq!(raw.common.category_tag.as_deref(), Some("hazard"));
        assert!(raw.common.uuid.is_none());
        assert!(raw.common.city.is_none());
    }
}
