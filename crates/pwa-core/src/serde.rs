use std::collections::BTreeMap;
use std::iter::FromIterator;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::errors::{ErrorInfo, PwaError};

fn serde_error(code: &str, err: impl ToString) -> PwaError {
    PwaError::Serde(ErrorInfo::new(code, err.to_string()))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let ordered = map
                .into_iter()
                .map(|(key, value)| (key, canonicalize(value)))
                .collect::<BTreeMap<_, _>>();
            Value::Object(Map::from_iter(ordered))
        }
        Value::Array(values) => Value::Array(values.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Serializes a value into canonical JSON bytes with deterministic key order.
pub fn to_canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, PwaError> {
    let value = serde_json::to_value(value).map_err(|err| serde_error("json_serialize", err))?;
    let mut bytes = Vec::new();
    serde_json::to_writer(&mut bytes, &canonicalize(value))
        .map_err(|err| serde_error("json_write", err))?;
    Ok(bytes)
}

/// Serializes a value into pretty, key-sorted JSON for files meant to be read
/// by people as well as tools.
pub fn to_canonical_json_pretty<T: Serialize>(value: &T) -> Result<String, PwaError> {
    let value = serde_json::to_value(value).map_err(|err| serde_error("json_serialize", err))?;
    serde_json::to_string_pretty(&canonicalize(value)).map_err(|err| serde_error("json_write", err))
}

/// Deserializes a value from JSON bytes.
pub fn from_json_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, PwaError> {
    serde_json::from_slice(data).map_err(|err| serde_error("json_deserialize", err))
}

/// Deserializes a YAML payload into the requested type.
pub fn from_yaml_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, PwaError> {
    serde_yaml::from_slice(data).map_err(|err| serde_error("yaml_deserialize", err))
}

/// Reads `path` and deserializes its JSON content.
pub fn read_json<T: DeserializeOwned>(path: &std::path::Path) -> Result<T, PwaError> {
    let bytes = std::fs::read(path).map_err(|err| PwaError::io("json-read", path, err))?;
    from_json_slice(&bytes).map_err(|err| match err {
        PwaError::Serde(info) => {
            PwaError::Serde(info.with_context("path", path.display().to_string()))
        }
        other => other,
    })
}

/// Writes `value` as pretty canonical JSON to `path`, creating parent
/// directories as needed.
pub fn write_json<T: Serialize>(path: &std::path::Path, value: &T) -> Result<(), PwaError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|err| PwaError::io("mkdir", parent, err))?;
        }
    }
    let json = to_canonical_json_pretty(value)?;
    std::fs::write(path, json).map_err(|err| PwaError::io("json-write", path, err))
}
