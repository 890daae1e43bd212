//! Typed accessors over the opaque per-row parameter object.

use crate::transform::TransformError;
use serde::de::DeserializeOwned;
use serde_json::{Map as JsonMap, Value as JsonValue};

/// Parameter bag handed to a transform's configure step. Built from the
/// route row's params JSON; invalid or empty JSON yields an empty bag.
#[derive(Debug, Clone, Default)]
pub struct TransformParams {
    values: JsonMap<String, JsonValue>,
}

impl TransformParams {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json_str(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::empty();
        }
        match serde_json::from_str::<JsonValue>(trimmed) {
            Ok(JsonValue::Object(values)) => Self { values },
            _ => Self::empty(),
        }
    }

    pub fn from_value(value: &JsonValue) -> Self {
        match value {
            JsonValue::Object(values) => Self {
                values: values.clone(),
            },
            _ => Self::empty(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Scalar value rendered as a string, `None` when absent or non-scalar.
    pub fn string(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            JsonValue::String(text) => Some(text.clone()),
            JsonValue::Number(number) => Some(number.to_string()),
            JsonValue::Bool(flag) => Some(flag.to_string()),
            _ => None,
        }
    }

    /// Like [`string`](Self::string) but a missing key fails fast with the
    /// key name attached.
    pub fn require_string(&self, key: &str) -> Result<String, TransformError> {
        self.string(key).ok_or_else(|| TransformError::missing(key))
    }

    /// Boolean value; string `"true"`/`"false"` is accepted as a fallback.
    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        match self.values.get(key) {
            Some(JsonValue::Bool(flag)) => *flag,
            Some(JsonValue::String(text)) => match text.to_ascii_lowercase().as_str() {
                "true" => true,
                "false" => false,
                _ => default,
            },
            _ => default,
        }
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        match self.values.get(key)? {
            JsonValue::Number(number) => number.as_i64(),
            JsonValue::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    /// Pipe-delimited string list, e.g. `"a|b|c"`. Empty segments are
    /// dropped.
    pub fn list(&self, key: &str) -> Vec<String> {
        self.string(key)
            .map(|raw| {
                raw.split('|')
                    .map(str::trim)
                    .filter(|segment| !segment.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Pipe-delimited pair map, e.g. `"sub=X-User-Id|email=X-User-Email"`.
    /// Preserves pair order; segments without `=` are dropped.
    pub fn pair_map(&self, key: &str) -> Vec<(String, String)> {
        self.string(key)
            .map(|raw| {
                raw.split('|')
                    .filter_map(|segment| {
                        let (left, right) = segment.split_once('=')?;
                        let left = left.trim();
                        let right = right.trim();
                        if left.is_empty() {
                            return None;
                        }
                        Some((left.to_string(), right.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn value(&self, key: &str) -> Option<&JsonValue> {
        self.values.get(key)
    }

    /// Deserialises the whole bag into a typed options struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, TransformError> {
        serde_json::from_value(JsonValue::Object(self.values.clone())).map_err(|err| {
            TransformError::invalid("<params>", err.to_string())
        })
    }
}
