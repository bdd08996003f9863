//! Content digests for commit payloads and stored artifacts.
//!
//! Payload digests are SHA-256 over the canonical JSON encoding: object keys
//! sorted at every depth, compact separators. Two machines serializing the
//! same value therefore always agree on the hash, whatever map ordering their
//! serde_json build uses.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Rebuild `value` with object keys in sorted order at every depth.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Compact canonical JSON text for `value`.
pub fn canonical_json(value: &Value) -> String {
    // Serializing a `Value` cannot fail: every key is already a string.
    serde_json::to_string(&canonicalize(value)).unwrap_or_default()
}

/// Digest of any serializable value via its canonical JSON form.
pub fn content_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    Ok(sha256_hex(canonical_json(&value).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_change_hash() {
        let a: Value = serde_json::from_str(r#"{"b":1,"a":{"y":2,"x":[{"q":1,"p":2}]}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":{"x":[{"p":2,"q":1}],"y":2},"b":1}"#).unwrap();
        assert_eq!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
    }

    #[test]
    fn canonical_json_is_compact_and_sorted() {
        assert_eq!(canonical_json(&json!({"z": 1, "a": [true, null]})), r#"{"a":[true,null],"z":1}"#);
    }

    #[test]
    fn array_order_changes_hash() {
        assert_ne!(
            content_hash(&json!([1, 2])).unwrap(),
            content_hash(&json!([2, 1])).unwrap()
        );
    }

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
