//! Shared helpers for JSON extraction and numeric formatting.

use serde_json::Value;

/// Extract string from JSON value by key.
#[inline]
pub fn json_string(value: &Value, key: &str) -> Option<String> {
    value.get(key)?.as_str().map(String::from)
}

/// Flatten a completion `content` value into plain text.
///
/// Accepts a bare string, an object carrying `text`, or an array of content
/// blocks (each a string or an object with `text`). Anything else yields an
/// empty string.
pub fn content_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) => json_string(value, "text").unwrap_or_default(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|block| match block {
                Value::String(s) => Some(s.clone()),
                Value::Object(_) => json_string(block, "text"),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

/// Round to a fixed number of decimal places
#[inline]
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Truncate to at most `max_chars` characters, appending an ellipsis when cut
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_text_shapes() {
        assert_eq!(content_text(&json!("ok")), "ok");
        assert_eq!(content_text(&json!({"type": "text", "text": "hi"})), "hi");
        assert_eq!(
            content_text(&json!([{"type": "text", "text": "a"}, "b", 3])),
            "ab"
        );
        assert_eq!(content_text(&json!(null)), "");
        assert_eq!(content_text(&json!({"type": "image"})), "");
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(0.000_301_87, 4), 0.0003);
        assert_eq!(round_to(1.23456, 2), 1.23);
    }

    #[test]
    fn test_truncate_preview() {
        assert_eq!(truncate_preview("short", 10), "short");
        assert_eq!(truncate_preview("héllo wörld", 5), "héllo...");
    }
}
