// src/normalize/coerce.rs
//! Lenient readers over untyped JSON values.

use serde_json::Value;

/// Null and absent are the same thing for every raw field.
pub fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

/// Identifier-like value: non-empty string or number. Everything else is missing.
pub fn identifier(value: Option<&Value>) -> Option<String> {
    match present(value)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Finite f64 from a number or a numeric string.
pub fn float(value: &Value) -> Option<f64> {
    let f = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    f.is_finite().then_some(f)
}

/// Display text for scalars; `None` for null, absent, arrays and objects.
pub fn text(value: Option<&Value>) -> Option<String> {
    match present(value)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Like [`text`] but empty strings count as missing.
pub fn non_empty_text(value: Option<&Value>) -> Option<String> {
    text(value).filter(|s| !s.is_empty())
}
