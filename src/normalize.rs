//! Defensive field extraction from untyped JSON.
//!
//! Report bodies are versioned independently of this crate, so every reader
//! here answers "not present" instead of failing when a value has an
//! unexpected type.

use serde_json::{Map, Value};

/// The value as a string-keyed record, if it is a JSON object.
#[must_use]
pub fn as_record(value: &Value) -> Option<&Map<String, Value>> {
    value.as_object()
}

/// A finite number taken either from a JSON number or from a non-empty
/// string that parses as one.
#[must_use]
pub fn numeric_from_unknown(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<f64>().ok()?
        }
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// A non-empty string value.
#[must_use]
pub fn string_from_unknown(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.as_str()),
        _ => None,
    }
}

/// First key in `keys` whose value yields a number.
#[must_use]
pub fn first_numeric(record: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|k| record.get(*k))
        .find_map(numeric_from_unknown)
}

/// First key in `keys` whose value is a non-empty string.
#[must_use]
pub fn first_string<'a>(record: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| record.get(*k))
        .find_map(string_from_unknown)
}

/// Non-empty strings from an array value; anything else yields nothing.
pub fn string_items(value: Option<&Value>) -> impl Iterator<Item = &str> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(string_from_unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn as_record_only_accepts_objects() {
        assert!(as_record(&json!({"a": 1})).is_some());
        assert!(as_record(&json!(null)).is_none());
        assert!(as_record(&json!([1, 2])).is_none());
        assert!(as_record(&json!("x")).is_none());
    }

    #[test]
    fn numeric_accepts_numbers_and_numeric_strings() {
        assert_eq!(numeric_from_unknown(&json!(0.5)), Some(0.5));
        assert_eq!(numeric_from_unknown(&json!(42)), Some(42.0));
        assert_eq!(numeric_from_unknown(&json!("87.3")), Some(87.3));
        assert_eq!(numeric_from_unknown(&json!(" 12 ")), Some(12.0));
    }

    #[test]
    fn numeric_rejects_everything_else() {
        assert_eq!(numeric_from_unknown(&json!("")), None);
        assert_eq!(numeric_from_unknown(&json!("abc")), None);
        assert_eq!(numeric_from_unknown(&json!("NaN")), None);
        assert_eq!(numeric_from_unknown(&json!("inf")), None);
        assert_eq!(numeric_from_unknown(&json!(true)), None);
        assert_eq!(numeric_from_unknown(&json!([1])), None);
        assert_eq!(numeric_from_unknown(&json!({"v": 1})), None);
        assert_eq!(numeric_from_unknown(&json!(null)), None);
    }

    #[test]
    fn first_numeric_skips_unusable_keys() {
        let v = json!({"coveragePercent": "n/a", "coverage": 0.7});
        let rec = as_record(&v).unwrap();
        assert_eq!(first_numeric(rec, &["coveragePercent", "coverage"]), Some(0.7));
        assert_eq!(first_numeric(rec, &["lineCoverage"]), None);
    }

    #[test]
    fn string_items_filters_empty_and_non_strings() {
        let v = json!(["a", "", 3, null, "b"]);
        let items: Vec<_> = string_items(Some(&v)).collect();
        assert_eq!(items, vec!["a", "b"]);
        assert_eq!(string_items(None).count(), 0);
        assert_eq!(string_items(Some(&json!("a"))).count(), 0);
    }
}
