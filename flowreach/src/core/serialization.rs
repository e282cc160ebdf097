use super::error::{CoreError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Compute a stable hash of serialized bytes.
///
/// Uses SeaHash, which is stable across Rust compiler versions, process
/// restarts and machines. Graph keys computed on one instance must match the
/// keys computed on every other instance sharing the cache, so the standard
/// library's randomly seeded hasher cannot be used here.
///
/// Note: This is NOT cryptographically secure. Settings are not adversarial
/// input for the cache partitioning.
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    seahash::hash(bytes)
}

/// Serializes a value to bytes using JSON.
///
/// # Errors
/// Returns `CoreError::Serialization` if the value cannot be serialized.
pub fn serialize_value<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(CoreError::Serialization)
}

/// Deserializes bytes to a value using JSON.
///
/// # Errors
/// Returns `CoreError::Deserialization` if the bytes cannot be deserialized.
pub fn deserialize_value<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(CoreError::Deserialization)
}

/// Renders a JSON value in canonical form: object keys sorted, no whitespace.
///
/// Two settings objects that differ only in key order or formatting produce
/// the same canonical string, and therefore the same graph key.
pub fn canonical_json(value: &Value) -> Result<String> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) -> Result<()> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            out.push_str(&serde_json::to_string(s).map_err(CoreError::Serialization)?)
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push('{');
            for (i, (key, item)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).map_err(CoreError::Serialization)?);
                out.push(':');
                write_canonical(item, out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_bytes() {
        let a = serialize_value(&Some("beta".to_string())).unwrap();
        let b = serialize_value(&None::<String>).unwrap();

        assert_ne!(hash_bytes(&a), hash_bytes(&b));
        assert_eq!(hash_bytes(&a), hash_bytes(&a.clone()));
    }

    #[test]
    fn test_serialization() {
        let test_value = vec!["hello".to_string(), "world".to_string()];
        let serialized = serialize_value(&test_value).unwrap();
        let deserialized: Vec<String> = deserialize_value(&serialized).unwrap();
        assert_eq!(test_value, deserialized);
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let a = json!({"b": 1, "a": {"y": [1, 2], "x": "s"}});
        let b = json!({"a": {"x": "s", "y": [1, 2]}, "b": 1});

        let canonical = canonical_json(&a).unwrap();
        assert_eq!(canonical, r#"{"a":{"x":"s","y":[1,2]},"b":1}"#);
        assert_eq!(canonical, canonical_json(&b).unwrap());
    }

    #[test]
    fn test_canonical_json_escapes_strings() {
        let v = json!({"quote\"key": "line\nbreak"});
        assert_eq!(canonical_json(&v).unwrap(), r#"{"quote\"key":"line\nbreak"}"#);
    }

    #[test]
    fn test_canonical_json_preserves_array_order() {
        assert_ne!(
            canonical_json(&json!([1, 2])).unwrap(),
            canonical_json(&json!([2, 1])).unwrap()
        );
    }
}
