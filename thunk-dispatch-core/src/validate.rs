//! Runtime shape checks for names and JSON values

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// The runtime kind of a JSON value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
}

impl ValueKind {
    /// Classify a value
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Boolean,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Boolean => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value did not have the shape its call site requires.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Expected {context} to be a {expected}. Instead received: '{received}'.")]
pub struct ValidationError {
    /// What was being checked (e.g. "action type")
    pub context: String,
    /// Human-readable expected shape
    pub expected: String,
    /// The offending value, rendered
    pub received: String,
}

impl ValidationError {
    pub fn new(
        context: impl Into<String>,
        expected: impl Into<String>,
        received: impl Into<String>,
    ) -> Self {
        Self {
            context: context.into(),
            expected: expected.into(),
            received: received.into(),
        }
    }

    /// `value` is not of the `expected` kind
    pub fn mismatch(value: &Value, expected: ValueKind, context: &str) -> Self {
        let received = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self::new(context, expected.as_str(), received)
    }
}

/// Fail unless `value` is of the `expected` kind.
///
/// # Example
/// ```
/// use serde_json::json;
/// use thunk_dispatch_core::validate::{check_type, ValueKind};
///
/// assert!(check_type(&json!({}), ValueKind::Object, "default state").is_ok());
///
/// let err = check_type(&json!(3), ValueKind::Object, "default state").unwrap_err();
/// assert_eq!(
///     err.to_string(),
///     "Expected default state to be a object. Instead received: '3'."
/// );
/// ```
pub fn check_type(
    value: &Value,
    expected: ValueKind,
    context: &str,
) -> Result<(), ValidationError> {
    if ValueKind::of(value) == expected {
        return Ok(());
    }
    Err(ValidationError::mismatch(value, expected, context))
}
