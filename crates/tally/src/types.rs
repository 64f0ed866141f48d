use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A proposed operation: name plus untyped arguments, as the language model
/// produced them. Typing happens in [`crate::request::LedgerRequest::from_call`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl OperationCall {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Call with no arguments
    pub fn bare(name: impl Into<String>) -> Self {
        Self::new(name, Map::new())
    }

    /// Build from a JSON object; anything else yields no arguments.
    pub fn from_json(name: impl Into<String>, arguments: Value) -> Self {
        match arguments {
            Value::Object(map) => Self::new(name, map),
            _ => Self::bare(name),
        }
    }
}

/// Outcome of one dispatched call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationResult {
    Success { name: String, payload: Value },
    Failure { name: String, error: String },
}

impl OperationResult {
    pub fn success(name: impl Into<String>, payload: Value) -> Self {
        Self::Success {
            name: name.into(),
            payload,
        }
    }

    pub fn failure(name: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::Failure {
            name: name.into(),
            error: error.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Success { name, .. } | Self::Failure { name, .. } => name,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// One reply line: the payload as compact JSON, or the error text
    pub fn to_line(&self) -> String {
        match self {
            Self::Success { name, payload } => format!("{} result: {}", name, payload),
            Self::Failure { name, error } => format!("Error executing {}: {}", name, error),
        }
    }
}
