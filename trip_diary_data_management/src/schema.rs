//! Versioned encoding of stored values.
//!
//! Values are written as `{"version": 1, "data": ...}`. Bare JSON without an
//! envelope is the layout written before versioning existed and is read as
//! version 0.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

pub const SCHEMA_VERSION: u64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("malformed value: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("stored with schema version {0}, newest known is {SCHEMA_VERSION}")]
    UnsupportedVersion(u64),
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    version: u64,
    data: &'a T,
}

pub fn encode<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Envelope {
        version: SCHEMA_VERSION,
        data: value,
    })
}

pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, SchemaError> {
    let value: Value = serde_json::from_str(raw)?;

    let (version, data) = match value {
        Value::Object(mut map) if map.len() == 2 && map.contains_key("data") => {
            match map.get("version").and_then(Value::as_u64) {
                Some(version) => (version, map.remove("data").unwrap_or(Value::Null)),
                None => (0, Value::Object(map)),
            }
        }
        other => (0, other),
    };

    if version > SCHEMA_VERSION {
        return Err(SchemaError::UnsupportedVersion(version));
    }

    Ok(serde_json::from_value(data)?)
}

#[test]
fn encoded_values_carry_the_version() {
    let raw = encode(&vec![1, 2, 3]).unwrap();
    let value: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["version"], SCHEMA_VERSION);
    assert_eq!(decode::<Vec<i32>>(&raw).unwrap(), vec![1, 2, 3]);
}

#[test]
fn bare_values_are_read_as_legacy() {
    assert!(decode::<bool>("true").unwrap());
    assert_eq!(decode::<Vec<String>>("[\"a\"]").unwrap(), vec!["a".to_string()]);
}

#[test]
fn newer_versions_are_rejected() {
    let err = decode::<bool>(r#"{"version": 9, "data": true}"#).unwrap_err();
    assert!(matches!(err, SchemaError::UnsupportedVersion(9)));
}

#[test]
fn garbage_is_malformed() {
    assert!(matches!(decode::<bool>("{not json"), Err(SchemaError::Malformed(_))));
    assert!(matches!(decode::<Vec<i32>>(r#"{"version": 1, "data": "nope"}"#), Err(SchemaError::Malformed(_))));
}
