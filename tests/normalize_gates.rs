// tests/normalize_gates.rs
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use traffic_normalizer::normalize::{transform_document, DiscardReason};
use traffic_normalizer::{normalize_document, Document};

fn doc(v: Value) -> Document {
    v.as_object().cloned().expect("object")
}

fn alert(extra: Value) -> Document {
    let mut d = doc(json!({
        "source_category": "alert",
        "uuid": "alert-1",
        "location": {"x": -70.55, "y": -33.41},
        "pubMillis": 1_700_000_000_000i64,
        "capture_timestamp": "2024-01-01T00:00:00Z",
        "type": "ACCIDENT"
    }));
    for (k, v) in doc(extra) {
        if v.is_null() {
            d.remove(&k);
        } else {
            d.insert(k, v);
        }
    }
    d
}

#[test]
fn missing_uuid_is_discarded() {
    let d = alert(json!({"uuid": null}));
    assert_eq!(transform_document(&d), Err(DiscardReason::MissingId));
    assert!(normalize_document(&d).is_none());
}

#[test]
fn empty_uuid_is_discarded() {
    let d = alert(json!({"uuid": ""}));
    assert_eq!(transform_document(&d), Err(DiscardReason::MissingId));
}

#[test]
fn id_fallback_only_applies_to_user_locations() {
    let user = doc(json!({
        "source_category": "user_location",
        "id": "user-9",
        "location": {"x": 1.0, "y": 2.0},
        "capture_timestamp": "2024-01-01T00:00:00Z"
    }));
    let ev = transform_document(&user).unwrap();
    assert_eq!(ev.original_id, "user-9");

    let alert_with_id = alert(json!({"uuid": null, "id": "not-used"}));
    assert_eq!(
        transform_document(&alert_with_id),
        Err(DiscardReason::MissingId)
    );

    let user_without_ids = doc(json!({
        "source_category": "user_location",
        "location": {"x": 1.0, "y": 2.0},
        "capture_timestamp": "2024-01-01T00:00:00Z"
    }));
    assert_eq!(
        transform_document(&user_without_ids),
        Err(DiscardReason::MissingId)
    );
}

#[test]
fn non_numeric_coordinates_are_discarded() {
    for loc in [
        json!({"x": "west", "y": -33.4}),
        json!({"x": -70.5, "y": null}),
        json!({"x": [1], "y": 2}),
        json!({"x": true, "y": 2}),
    ] {
        let d = alert(json!({ "location": loc }));
        assert_eq!(
            transform_document(&d),
            Err(DiscardReason::NonNumericCoordinates),
            "location {loc}"
        );
    }
}

#[test]
fn missing_coordinates_are_discarded() {
    for loc in [json!({"x": -70.5}), json!("somewhere"), Value::Null] {
        let d = alert(json!({ "location": loc }));
        assert_eq!(
            transform_document(&d),
            Err(DiscardReason::MissingCoordinates)
        );
    }
}

#[test]
fn numeric_string_coordinates_are_coerced() {
    let d = alert(json!({"location": {"x": "-70.5", "y": " -33.25 "}}));
    let ev = transform_document(&d).unwrap();
    assert_eq!(ev.longitude, -70.5);
    assert_eq!(ev.latitude, -33.25);
}

#[test]
fn pub_millis_is_primary_event_time() {
    let ev = transform_document(&alert(json!({}))).unwrap();
    assert_eq!(
        ev.event_timestamp,
        Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap()
    );
}

#[test]
fn capture_time_is_used_without_pub_millis() {
    let ev = transform_document(&alert(json!({"pubMillis": null}))).unwrap();
    assert_eq!(
        ev.event_timestamp,
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    );
}

#[test]
fn corrupt_pub_millis_falls_back_to_capture_time() {
    let ev = transform_document(&alert(json!({"pubMillis": "not-a-number"}))).unwrap();
    assert_eq!(
        ev.event_timestamp,
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    );
    assert_eq!(ev.weekday, Some(0));
    assert_eq!(ev.hour_of_day, Some(0));
}

#[test]
fn no_usable_time_source_is_discarded() {
    let no_capture = alert(json!({"pubMillis": null, "capture_timestamp": null}));
    assert_eq!(
        transform_document(&no_capture),
        Err(DiscardReason::NoEventTimestamp)
    );

    let bad_capture = alert(json!({"pubMillis": "x", "capture_timestamp": "garbage"}));
    assert_eq!(
        transform_document(&bad_capture),
        Err(DiscardReason::NoEventTimestamp)
    );
}

#[test]
fn bad_capture_time_is_soft_when_pub_millis_is_valid() {
    let ev = transform_document(&alert(json!({"capture_timestamp": "garbage"}))).unwrap();
    assert!(ev.capture_timestamp.is_none());

    let ev = transform_document(&alert(json!({"capture_timestamp": null}))).unwrap();
    assert!(ev.capture_timestamp.is_none());
}

#[test]
fn capture_time_is_reparsed_independently() {
    let ev = transform_document(&alert(json!({}))).unwrap();
    assert_eq!(
        ev.capture_timestamp,
        Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    );
}

#[test]
fn legacy_capture_field_is_read() {
    let d = doc(json!({
        "evento_tipo_waze": "alerta",
        "uuid": "old-1",
        "location": {"x": 1.0, "y": 2.0},
        "timestamp_scrape": "2024-06-01T10:30:00.000000Z"
    }));
    let ev = transform_document(&d).unwrap();
    assert_eq!(ev.source_category_original.as_deref(), Some("alerta"));
    assert_eq!(ev.hour_of_day, Some(10));
}
