//! Typed access to tool call arguments.

use serde_json::Value;

use super::types::ToolParameters;
use crate::error::{Result, TalkwireError};

/// Parsed arguments of one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolArguments {
    value: Value,
}

impl ToolArguments {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// Parse the raw argument text accumulated from the stream.
    ///
    /// Blank input is treated as `{}`.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::new(Value::Object(Default::default())));
        }
        serde_json::from_str(trimmed)
            .map(Self::new)
            .map_err(|e| TalkwireError::InvalidArgument(format!("arguments are not valid JSON: {e}")))
    }

    pub fn raw(&self) -> &Value {
        &self.value
    }

    /// Shallow check against the tool's schema: object shape, required
    /// keys, and declared property types.
    pub fn validate(&self, parameters: &ToolParameters) -> Result<()> {
        let Some(obj) = self.value.as_object() else {
            return Err(TalkwireError::InvalidArgument(format!(
                "expected an object, got {}",
                type_name(&self.value)
            )));
        };
        if let Some(missing) = parameters.required().find(|name| !obj.contains_key(*name)) {
            return Err(TalkwireError::InvalidArgument(format!(
                "missing required argument '{missing}'"
            )));
        }
        for (key, value) in obj {
            if let Some(expected) = parameters.property_type(key) {
                if !matches_type(value, expected) {
                    return Err(TalkwireError::InvalidArgument(format!(
                        "argument '{key}' should be {expected}, got {}",
                        type_name(value)
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn get_str(&self, key: &str) -> Result<&str> {
        self.get_str_opt(key)
            .ok_or_else(|| TalkwireError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Result<i64> {
        self.value
            .get(key)
            .and_then(Value::as_i64)
            .ok_or_else(|| TalkwireError::InvalidArgument(format!("Missing integer argument: {key}")))
    }

    pub fn get_f64(&self, key: &str) -> Result<f64> {
        self.value
            .get(key)
            .and_then(Value::as_f64)
            .ok_or_else(|| TalkwireError::InvalidArgument(format!("Missing number argument: {key}")))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.value
            .get(key)
            .and_then(Value::as_bool)
            .ok_or_else(|| TalkwireError::InvalidArgument(format!("Missing boolean argument: {key}")))
    }

    /// Deserialize the whole argument object into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.value.clone())
            .map_err(|e| TalkwireError::InvalidArgument(format!("Failed to deserialize arguments: {e}")))
    }
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
