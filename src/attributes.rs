//! Attribute data model and wire codec
//!
//! Defines the key/value types exchanged with the device-management
//! platform and the JSON codec that maps them onto the wire payloads.
//! The synchronization core only ever sees decoded [`AttributeSet`]s;
//! payload bytes stop at this module boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Errors produced while validating attributes or decoding payloads
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("attribute key must not be empty")]
    EmptyKey,
    #[error("payload is not valid JSON")]
    InvalidJson(#[source] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
}

/// Immutable, non-empty name of one piece of shared state (e.g. "ledState")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeKey(String);

impl AttributeKey {
    /// Create a key, rejecting the empty string
    pub fn new<S: Into<String>>(name: S) -> Result<Self, CodecError> {
        let name = name.into();
        if name.is_empty() {
            return Err(CodecError::EmptyKey);
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One attribute value as the platform's JSON encoding can represent it
///
/// This agent only ever produces and consumes the `Bool` variant, but the
/// codec decodes the other scalar shapes losslessly rather than coercing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl AttributeValue {
    /// Boolean payload, or `None` for non-boolean variants
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

/// One decoded payload: ordered `(key, value)` pairs, keys unique
///
/// Produced transiently per inbound message and not retained by the core.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSet {
    entries: Vec<(AttributeKey, AttributeValue)>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pair, replacing any existing entry under the same key
    pub fn insert(&mut self, key: AttributeKey, value: AttributeValue) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Find a value by key
    pub fn get(&self, key: &AttributeKey) -> Option<&AttributeValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, key: &AttributeKey) -> bool {
        self.get(key).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(AttributeKey, AttributeValue)> {
        self.entries.iter()
    }
}

/// Decode a JSON object payload into an [`AttributeSet`]
///
/// Non-scalar values (nested objects, arrays, null) carry no meaning for
/// this agent and are skipped with a debug log. A payload that is not a
/// JSON object at all is a codec error; the caller treats it as
/// "no authoritative value" rather than a fatal condition.
pub fn decode(payload: &[u8]) -> Result<AttributeSet, CodecError> {
    let value: Value = serde_json::from_slice(payload).map_err(CodecError::InvalidJson)?;
    let map = value.as_object().ok_or(CodecError::NotAnObject)?;

    let mut set = AttributeSet::new();
    for (name, raw) in map {
        let key = AttributeKey::new(name.clone())?;
        let decoded = match raw {
            Value::Bool(b) => AttributeValue::Bool(*b),
            Value::Number(n) => match n.as_f64() {
                Some(f) => AttributeValue::Number(f),
                None => continue,
            },
            Value::String(s) => AttributeValue::Text(s.clone()),
            other => {
                tracing::debug!(key = %name, value = ?other, "Skipping non-scalar attribute value");
                continue;
            }
        };
        set.insert(key, decoded);
    }
    Ok(set)
}

/// Encode a single-attribute client report as a JSON object payload
pub fn encode_report(key: &AttributeKey, value: &AttributeValue) -> Vec<u8> {
    let mut map = serde_json::Map::new();
    map.insert(
        key.as_str().to_string(),
        serde_json::to_value(value).unwrap_or(Value::Null),
    );
    Value::Object(map).to_string().into_bytes()
}

/// Encode the platform's client-attribute fetch request body
///
/// The platform expects `{"clientKeys": "a,b,c"}` with the requested key
/// names joined by commas.
pub fn encode_client_keys<'a, I>(keys: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a AttributeKey>,
{
    let joined = keys
        .into_iter()
        .map(AttributeKey::as_str)
        .collect::<Vec<_>>()
        .join(",");
    serde_json::json!({ "clientKeys": joined })
        .to_string()
        .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> AttributeKey {
        AttributeKey::new(name).unwrap()
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(matches!(AttributeKey::new(""), Err(CodecError::EmptyKey)));
        assert!(AttributeKey::new("ledState").is_ok());
    }

    #[test]
    fn test_decode_boolean_attribute() {
        let set = decode(br#"{"ledState": true}"#).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(
            set.get(&key("ledState")).and_then(AttributeValue::as_bool),
            Some(true)
        );
    }

    #[test]
    fn test_decode_mixed_scalars() {
        let set = decode(br#"{"ledState": false, "brightness": 42, "label": "porch"}"#).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(
            set.get(&key("brightness")),
            Some(&AttributeValue::Number(42.0))
        );
        assert_eq!(
            set.get(&key("label")),
            Some(&AttributeValue::Text("porch".to_string()))
        );
    }

    #[test]
    fn test_decode_skips_non_scalars() {
        let set = decode(br#"{"nested": {"a": 1}, "list": [1], "gone": null, "ok": true}"#).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains(&key("ok")));
    }

    #[test]
    fn test_decode_malformed_json() {
        assert!(matches!(
            decode(b"{not json"),
            Err(CodecError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_decode_non_object_payload() {
        assert!(matches!(decode(b"[1,2,3]"), Err(CodecError::NotAnObject)));
        assert!(matches!(decode(b"true"), Err(CodecError::NotAnObject)));
    }

    #[test]
    fn test_insert_replaces_duplicate_key() {
        let mut set = AttributeSet::new();
        set.insert(key("ledState"), AttributeValue::Bool(false));
        set.insert(key("ledState"), AttributeValue::Bool(true));
        assert_eq!(set.len(), 1);
        assert_eq!(
            set.get(&key("ledState")).and_then(AttributeValue::as_bool),
            Some(true)
        );
    }

    #[test]
    fn test_encode_report_shape() {
        let payload = encode_report(&key("ledState"), &AttributeValue::Bool(true));
        let value: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value, serde_json::json!({"ledState": true}));
    }

    #[test]
    fn test_encode_client_keys_body() {
        let keys = [key("ledState"), key("mode")];
        let payload = encode_client_keys(keys.iter());
        let value: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value, serde_json::json!({"clientKeys": "ledState,mode"}));
    }

    #[test]
    fn test_non_bool_value_is_not_bool() {
        assert_eq!(AttributeValue::Number(1.0).as_bool(), None);
        assert_eq!(AttributeValue::Text("true".into()).as_bool(), None);
    }
}
