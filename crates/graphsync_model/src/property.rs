//! Property values for graph-object property bags.

use serde::{Deserialize, Serialize};

/// A value in a graph object's dynamic property bag.
///
/// Properties are restricted to scalars and homogeneous arrays of scalars;
/// the closed variant keeps arbitrary nested structures out of the bag.
/// Nested source payloads belong in an entity's raw data instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Explicit null.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Numeric scalar.
    Number(f64),
    /// String scalar.
    String(String),
    /// Homogeneous boolean array.
    BoolArray(Vec<bool>),
    /// Homogeneous numeric array.
    NumberArray(Vec<f64>),
    /// Homogeneous string array.
    StringArray(Vec<String>),
}

impl PropertyValue {
    /// Returns true for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    /// Returns the string scalar, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the numeric scalar, if this is one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean scalar, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the string values carried by this property.
    ///
    /// A string scalar yields a single value; a string array yields all of
    /// them. Other variants yield nothing.
    pub fn string_values(&self) -> Vec<String> {
        match self {
            PropertyValue::String(s) => vec![s.clone()],
            PropertyValue::StringArray(values) => values.clone(),
            _ => Vec::new(),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Number(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Number(value as f64)
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        PropertyValue::Number(f64::from(value))
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(values: Vec<String>) -> Self {
        PropertyValue::StringArray(values)
    }
}

impl From<Vec<&str>> for PropertyValue {
    fn from(values: Vec<&str>) -> Self {
        PropertyValue::StringArray(values.into_iter().map(String::from).collect())
    }
}

impl From<Vec<f64>> for PropertyValue {
    fn from(values: Vec<f64>) -> Self {
        PropertyValue::NumberArray(values)
    }
}

impl From<Vec<bool>> for PropertyValue {
    fn from(values: Vec<bool>) -> Self {
        PropertyValue::BoolArray(values)
    }
}
