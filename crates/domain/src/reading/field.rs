use serde_json::Value;

/// Read a numeric field addressed by a dot-separated path (`"power.active"`).
///
/// JSON numbers and numeric strings are accepted. Returns `None` when the
/// path is absent or the value is not numeric.
pub fn extract_number(payload: &Value, path: &str) -> Option<f64> {
    let mut current = payload;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    match current {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_top_level_number() {
        assert_eq!(extract_number(&json!({"kw": 4.2}), "kw"), Some(4.2));
    }

    #[test]
    fn test_nested_path() {
        let payload = json!({"power": {"active": 10, "reactive": "3.5"}});
        assert_eq!(extract_number(&payload, "power.active"), Some(10.0));
        assert_eq!(extract_number(&payload, "power.reactive"), Some(3.5));
    }

    #[test]
    fn test_array_index() {
        let payload = json!({"phases": [{"kw": 1.0}, {"kw": 2.0}]});
        assert_eq!(extract_number(&payload, "phases.1.kw"), Some(2.0));
        assert_eq!(extract_number(&payload, "phases.5.kw"), None);
    }

    #[test]
    fn test_non_numeric_values() {
        let payload = json!({"state": "on", "flag": true, "nan": "NaN"});
        assert_eq!(extract_number(&payload, "state"), None);
        assert_eq!(extract_number(&payload, "flag"), None);
        assert_eq!(extract_number(&payload, "nan"), None);
        assert_eq!(extract_number(&payload, "missing"), None);
    }
}
