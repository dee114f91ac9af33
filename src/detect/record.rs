use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::detect::DetectError;

/// A normalized input event. Field names map to arbitrary JSON values; the
/// detectors only look at a handful of them and everything else is carried
/// along untouched as context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Build a record from a decoded JSON value.
    ///
    /// The value must be a non-empty JSON object.
    pub fn from_value(value: Value) -> Result<Self, DetectError> {
        match value {
            Value::Object(fields) if fields.is_empty() => {
                Err(DetectError::InvalidRecord("no data provided".to_string()))
            }
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(DetectError::InvalidRecord(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn from_json_str(s: &str) -> Result<Self, DetectError> {
        let value: Value = serde_json::from_str(s)
            .map_err(|e| DetectError::InvalidRecord(format!("invalid JSON: {e}")))?;
        Self::from_value(value)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Textual form of a field: strings as-is, anything else as its JSON text.
    pub fn text(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// The `port` field, when it holds an integral number.
    pub fn port(&self) -> Option<i64> {
        match self.fields.get("port")? {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            }),
            _ => None,
        }
    }

    /// The `source_ip` field as a source identifier. Empty values count as absent.
    pub fn source_ip(&self) -> Option<String> {
        match self.fields.get("source_ip")? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

impl TryFrom<Value> for Record {
    type Error = DetectError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
