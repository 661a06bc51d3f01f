//! Payload serialization and validity token derivation.
//!
//! Payloads are stored as JSON text in both layers. Tokens are a short
//! digest of the JSON form of the caller's validity value.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::Error;

/// Serialize a value into its stored text form.
pub fn serialize<T: Serialize + ?Sized>(value: &T) -> Result<String, Error> {
    serde_json::to_string(value).map_err(|e| Error::InvalidInput(format!("value is not serializable: {e}")))
}

/// Decode stored text back into a value.
///
/// Invalid text and shape mismatches both surface as `Error::CorruptEntry`.
pub fn deserialize<T: DeserializeOwned>(text: &str) -> Result<T, Error> {
    serde_json::from_str(text).map_err(|e| Error::CorruptEntry(e.to_string()))
}

/// Derive the validity token for an optional reference value.
///
/// Blank values (null, `false`, zero, empty string, empty sequence or map)
/// disable token checking and yield 0. Anything else yields a non-zero
/// token taken from the SHA-256 of its JSON form.
pub fn derive_token<T: Serialize + ?Sized>(value: &T) -> i64 {
    let json = match serde_json::to_value(value) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(error = %e, "validity value is not serializable, token checking disabled");
            return 0;
        }
    };

    if is_blank(&json) {
        return 0;
    }

    let digest = Sha256::digest(json.to_string().as_bytes());
    let token = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    i64::from(token.max(1))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_nested_value_survives_storage() {
        let mut value = BTreeMap::new();
        value.insert("ids".to_string(), json!([1, 2, 3]));
        value.insert("meta".to_string(), json!({"title": "Ünïcode", "score": 4.5, "seen": null}));

        let text = serialize(&value).unwrap();
        let back: BTreeMap<String, Value> = deserialize(&text).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_corrupt_text() {
        let result = deserialize::<Value>("(1, 'not json'");
        assert!(matches!(result, Err(Error::CorruptEntry(_))));
    }

    #[test]
    fn test_shape_mismatch_is_corrupt() {
        let result = deserialize::<Vec<i32>>(r#"{"x": 1}"#);
        assert!(matches!(result, Err(Error::CorruptEntry(_))));
    }

    #[test]
    fn test_blank_values_disable_tokens() {
        assert_eq!(derive_token(""), 0);
        assert_eq!(derive_token(&Option::<String>::None), 0);
        assert_eq!(derive_token(&0), 0);
        assert_eq!(derive_token(&false), 0);
        assert_eq!(derive_token(&Vec::<i32>::new()), 0);
        assert_eq!(derive_token(&json!({})), 0);
    }

    #[test]
    fn test_token_stability() {
        assert_eq!(derive_token("v1.2"), derive_token("v1.2"));
        assert_eq!(derive_token(&json!({"a": 1, "b": 2})), derive_token(&json!({"b": 2, "a": 1})));
        assert_ne!(derive_token("v1.2"), 0);
    }

    #[test]
    fn test_token_discriminates() {
        // Same serialized length, different content.
        assert_ne!(derive_token("abc"), derive_token("abd"));
    }
}
