//! Extraction rules for individual payload values. Every function here is
//! total: unexpected types degrade to an empty/zero result.

use serde_json::Value;

/// Parses a score from a number or a numeric string (optional trailing `%`).
/// Returns `None` when the value is missing, unparseable, or not finite.
pub fn parse_score(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim_end().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Extracts a skill-like list: an array, a map of `{name}` objects, or a scalar.
pub fn skill_list(value: Option<&Value>) -> Vec<String> {
    extract_list(value, false)
}

/// Extracts a multi-line list (highlights, concerns, certifications). Same
/// sources as [`skill_list`], but leading bullet markers are removed.
pub fn line_list(value: Option<&Value>) -> Vec<String> {
    extract_list(value, true)
}

fn extract_list(value: Option<&Value>, strip_bullets: bool) -> Vec<String> {
    let entries: Vec<String> = match value {
        None | Some(Value::Null) => return vec![],
        Some(Value::String(s)) => split_delimited(s),
        Some(Value::Array(items)) => items.iter().filter_map(entry_text).collect(),
        Some(Value::Object(map)) => map
            .values()
            .filter_map(|v| v.get("name").and_then(entry_text))
            .collect(),
        Some(other) => entry_text(other).into_iter().collect(),
    };

    entries
        .iter()
        .map(|e| {
            if strip_bullets {
                clean_entry(strip_bullet(e))
            } else {
                clean_entry(e)
            }
        })
        .filter(|e| !e.is_empty())
        .collect()
}

/// Renders one list element. Objects contribute their `name`.
fn entry_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(_) => value.get("name").and_then(|n| n.as_str()).map(str::to_string),
        _ => None,
    }
}

/// Splits on newline; failing that comma, then semicolon; else one entry.
pub fn split_delimited(text: &str) -> Vec<String> {
    let separator = ['\n', ',', ';'].into_iter().find(|c| text.contains(*c));
    match separator {
        Some(sep) => text.split(sep).map(str::to_string).collect(),
        None => vec![text.to_string()],
    }
}

/// Trims and strips any number of trailing periods.
pub fn clean_entry(entry: &str) -> String {
    let mut cleaned = entry.trim();
    while let Some(rest) = cleaned.strip_suffix('.') {
        cleaned = rest.trim_end();
    }
    cleaned.to_string()
}

fn strip_bullet(line: &str) -> &str {
    line.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '•' | '*'))
}

/// Returns a trimmed, non-empty string value. Numbers are rendered.
pub fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Renders education from a string, a list, or a `{degree, institution, year}` object.
pub fn education(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Object(_) => structured_education(item),
                other => text(Some(other)).unwrap_or_default(),
            })
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Some(obj @ Value::Object(_)) => structured_education(obj),
        _ => String::new(),
    }
}

fn structured_education(obj: &Value) -> String {
    let degree = text(obj.get("degree"));
    let institution = text(obj.get("institution"));
    match (degree, institution) {
        (Some(degree), Some(institution)) => match text(obj.get("year")) {
            Some(year) => format!("{degree}, {institution} ({year})"),
            None => format!("{degree}, {institution}"),
        },
        _ => String::new(),
    }
}
