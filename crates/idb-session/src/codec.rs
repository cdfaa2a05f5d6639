//! String form of values kept in string-only scratch storage.
//!
//! Objects and arrays survive a round trip. Every other value comes back as the string that
//! scratch storage would have turned it into, so `1` is read back as `"1"`.

use serde_json::Value;

/// Text stored for `value`.
pub fn encode(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        // Objects, arrays and `null` are JSON-encoded; numbers and booleans already print as
        // their JSON text.
        other => other.to_string(),
    }
}

/// Value read back from stored `text`.
pub fn decode(text: &str) -> Value {
    match serde_json::from_str::<Value>(text) {
        Ok(parsed @ (Value::Object(_) | Value::Array(_))) => parsed,
        _ => Value::String(text.to_owned()),
    }
}

/// Whether `text` holds a JSON object or array.
pub fn is_json_object(text: &str) -> bool {
    matches!(
        serde_json::from_str::<Value>(text),
        Ok(Value::Object(_) | Value::Array(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn objects_and_arrays_round_trip() {
        for value in [
            json!({"a": 1, "nested": {"b": [true, null]}}),
            json!([1, "two", {"three": 3}]),
            json!({}),
            json!([]),
        ] {
            assert_eq!(decode(&encode(&value)), value);
        }
    }

    #[test]
    fn strings_pass_through() {
        assert_eq!(encode(&json!("plain")), "plain");
        assert_eq!(decode("plain"), json!("plain"));
    }

    #[test]
    fn scalars_come_back_as_strings() {
        assert_eq!(encode(&json!(42)), "42");
        assert_eq!(decode(&encode(&json!(42))), json!("42"));
        assert_eq!(decode(&encode(&json!(false))), json!("false"));
        assert_eq!(decode(&encode(&Value::Null)), json!("null"));
    }

    #[test]
    fn json_looking_string_is_decoded_as_object() {
        // A stored string that happens to be JSON object text cannot be told apart.
        assert_eq!(decode(&encode(&json!("{\"a\":1}"))), json!({"a": 1}));
    }

    #[test]
    fn is_json_object_only_accepts_composites() {
        assert!(is_json_object("{\"a\":1}"));
        assert!(is_json_object("[1,2]"));
        assert!(!is_json_object("12"));
        assert!(!is_json_object("\"text\""));
        assert!(!is_json_object("null"));
        assert!(!is_json_object("{broken"));
        assert!(!is_json_object(""));
    }

    #[test]
    fn malformed_json_is_returned_raw() {
        assert_eq!(decode("{not json"), json!("{not json"));
    }
}
