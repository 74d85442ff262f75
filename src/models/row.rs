//! Query parameters and result rows exchanged with a driver.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A bound query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Arrays and objects, bound as native JSON where the backend has it
    Json(JsonValue),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Json(_) => "json",
        }
    }

    /// Convert a JSON value into a parameter.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            JsonValue::String(s) => Self::String(s.clone()),
            other => Self::Json(other.clone()),
        }
    }
}

impl From<&str> for QueryParam {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for QueryParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for QueryParam {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A result row with its columns in result order.
///
/// Lookup by name is case-insensitive because catalogs disagree on the case
/// of the column labels they return (MySQL upper-cases `information_schema`
/// labels, for instance).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Row {
    columns: Vec<(String, JsonValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column, builder style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<JsonValue>) {
        self.columns.push((name.into(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Value of the column at `index`, in result order.
    pub fn get_index(&self, index: usize) -> Option<&JsonValue> {
        self.columns.get(index).map(|(_, v)| v)
    }

    /// Value of the named column. A SQL NULL is returned as `Some(Null)`.
    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.columns
            .iter()
            .find(|(col, _)| col.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Non-null value of the named column rendered as a string.
    pub fn get_str(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            JsonValue::Null => None,
            JsonValue::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Non-null value of the named column as an integer. Numeric strings are
    /// accepted since some catalogs report counts as text.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            JsonValue::Number(n) => n.as_i64(),
            JsonValue::Bool(b) => Some(i64::from(*b)),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Truthiness of the named column (`true`, non-zero numbers, `YES`, `t`, `1`).
    pub fn get_bool(&self, name: &str) -> bool {
        match self.get(name) {
            Some(JsonValue::Bool(b)) => *b,
            Some(JsonValue::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(JsonValue::String(s)) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "1" | "t" | "true" | "yes" | "y"
            ),
            _ => false,
        }
    }
}
