// src/extract/json.rs

use serde_json::{Map, Value};

use crate::error::Error;

/// One object from a JSON array response (e.g. a Socrata query result).
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRow(Map<String, Value>);

impl JsonRow {
    /// Text of `key`; numbers are rendered as text so scalar parsers see one
    /// grammar. A missing key or a non-scalar value is layout drift.
    pub fn text(&self, key: &str) -> Result<String, Error> {
        match self.0.get(key) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(other) => Err(Error::layout(format!(
                "field {key:?} is not a scalar: {other}"
            ))),
            None => Err(Error::layout(format!("field {key:?} missing"))),
        }
    }

    /// Category labels may legitimately be null in grouped queries; those
    /// come back as the empty label and must be listed in the vocabulary.
    pub fn label(&self, key: &str) -> Result<String, Error> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(String::new()),
            Some(_) => self.text(key),
        }
    }
}

/// Parse a body that must be a JSON array of objects.
pub fn json_rows(body: &str) -> Result<Vec<JsonRow>, Error> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| Error::layout(format!("response is not JSON: {e}")))?;
    let Value::Array(items) = value else {
        return Err(Error::layout("expected a JSON array"));
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => Ok(JsonRow(map)),
            other => Err(Error::layout(format!("expected an object, got {other}"))),
        })
        .collect()
}
