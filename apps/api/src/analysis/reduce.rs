//! Error reduction: collapses any error value the host or the analysis
//! service can produce into a single display string.
//!
//! Resolution order (first match wins):
//! 1. plain string
//! 2. `body.message` (with any "caused by" prefix cut away)
//! 3. `message`
//! 4. `statusText`, `detail`, `body.error`
//! 5. `body.stackTrace` / `stackTrace`
//! 6. `"Unknown error"`
//!
//! Arrays are reduced element-wise and joined with `", "`.

use serde_json::Value;

pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Markers after which a nested fault message carries the real cause.
/// Matched case-insensitively; the earliest occurrence wins.
const CAUSE_MARKERS: &[&str] = &["failed to save analysis results:", "caused by:"];

/// Reduces an arbitrary error value to one human-readable string. Never panics.
pub fn reduce(error: &Value) -> String {
    match error {
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter(|item| !item.is_null())
                .filter_map(reduce_single)
                .filter(|s| !s.is_empty())
                .collect();
            if parts.is_empty() {
                UNKNOWN_ERROR.to_string()
            } else {
                parts.join(", ")
            }
        }
        other => reduce_single(other).unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
    }
}

fn reduce_single(error: &Value) -> Option<String> {
    if let Some(s) = error.as_str() {
        return Some(s.to_string());
    }

    let obj = error.as_object()?;
    let body = obj.get("body");

    if let Some(message) = body.and_then(|b| str_field(b, "message")) {
        return Some(strip_cause_prefix(message));
    }
    if let Some(message) = str_field(error, "message") {
        return Some(message.to_string());
    }
    if let Some(text) = str_field(error, "statusText").or_else(|| str_field(error, "detail")) {
        return Some(text.to_string());
    }
    if let Some(text) = body.and_then(|b| str_field(b, "error")) {
        return Some(text.to_string());
    }
    if let Some(trace) = body
        .and_then(|b| str_field(b, "stackTrace"))
        .or_else(|| str_field(error, "stackTrace"))
    {
        return Some(format!("Error with stack trace: {trace}"));
    }

    None
}

/// Non-empty string field lookup.
fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

fn strip_cause_prefix(message: &str) -> String {
    let cut = CAUSE_MARKERS
        .iter()
        .filter_map(|marker| find_ascii_ignore_case(message, marker).map(|idx| idx + marker.len()))
        .min();

    match cut {
        Some(idx) => message[idx..].trim().to_string(),
        None => message.to_string(),
    }
}

/// Byte offset of an ASCII `needle` in `haystack`, ignoring ASCII case.
/// A match only ever covers ASCII bytes, so its end is a char boundary.
fn find_ascii_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}
