use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single cell payload.
///
/// Serializes to plain JSON (`null`, a number, a string, an array of strings
/// or an object) so rows travel over the wire without any tagging.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Null,
    Number(f64),
    Text(String),
    Tags(Vec<String>),
    Object(Map<String, Value>),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    pub fn tags<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CellValue::Tags(values.into_iter().map(Into::into).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Short, human readable name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            CellValue::Null => "null",
            CellValue::Number(_) => "number",
            CellValue::Text(_) => "text",
            CellValue::Tags(_) => "array",
            CellValue::Object(_) => "object",
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            CellValue::Null => Value::Null,
            CellValue::Number(value) => serde_json::Number::from_f64(*value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            CellValue::Text(value) => Value::String(value.clone()),
            CellValue::Tags(values) => {
                Value::Array(values.iter().cloned().map(Value::String).collect())
            }
            CellValue::Object(map) => Value::Object(map.clone()),
        }
    }

    /// Converts an arbitrary JSON value into the cell domain.
    ///
    /// Arrays holding anything but strings cannot be represented as tags and
    /// come back as `None`.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(CellValue::Null),
            Value::Bool(flag) => Some(CellValue::Text(flag.to_string())),
            Value::Number(number) => number.as_f64().map(CellValue::Number),
            Value::String(text) => Some(CellValue::Text(text)),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(text) => Some(text),
                    _ => None,
                })
                .collect::<Option<Vec<_>>>()
                .map(CellValue::Tags),
            Value::Object(map) => Some(CellValue::Object(map)),
        }
    }
}

impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        values_equal(self, other)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => Ok(()),
            CellValue::Number(value) => write!(f, "{value}"),
            CellValue::Text(value) => f.write_str(value),
            CellValue::Tags(_) | CellValue::Object(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<Vec<String>> for CellValue {
    fn from(values: Vec<String>) -> Self {
        CellValue::Tags(values)
    }
}

impl From<Map<String, Value>> for CellValue {
    fn from(map: Map<String, Value>) -> Self {
        CellValue::Object(map)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Null)
    }
}

/// Deep equality used for dirty detection.
///
/// Numbers compare by value (`0 == -0`), arrays element-wise, objects by key
/// set and per-key value regardless of insertion order. Values of different
/// kinds are never equal, so `5` and `"5"` differ.
pub fn values_equal(left: &CellValue, right: &CellValue) -> bool {
    match (left, right) {
        (CellValue::Null, CellValue::Null) => true,
        (CellValue::Number(a), CellValue::Number(b)) => a == b,
        (CellValue::Text(a), CellValue::Text(b)) => a == b,
        (CellValue::Tags(a), CellValue::Tags(b)) => a == b,
        (CellValue::Object(a), CellValue::Object(b)) => maps_equal(a, b),
        _ => false,
    }
}

fn maps_equal(left: &Map<String, Value>, right: &Map<String, Value>) -> bool {
    if std::ptr::eq(left, right) {
        return true;
    }
    left.len() == right.len()
        && left.iter().all(|(key, value)| {
            right
                .get(key)
                .is_some_and(|other| json_values_equal(value, other))
        })
}

/// Structural equality over nested JSON found inside object cells.
pub fn json_values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| json_values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => maps_equal(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> CellValue {
        CellValue::from_json(value).expect("object literal")
    }

    #[test]
    fn numbers_compare_by_value() {
        assert_eq!(CellValue::Number(0.0), CellValue::Number(-0.0));
        assert_eq!(CellValue::from(5_i64), CellValue::Number(5.0));
        assert_ne!(CellValue::Number(5.0), CellValue::text("5"));
    }

    #[test]
    fn null_only_equals_null() {
        assert_eq!(CellValue::Null, CellValue::Null);
        assert_ne!(CellValue::Null, CellValue::text(""));
        assert_ne!(CellValue::Null, CellValue::Number(0.0));
    }

    #[test]
    fn tags_compare_element_wise() {
        assert_eq!(CellValue::tags(["a", "b"]), CellValue::tags(["a", "b"]));
        assert_ne!(CellValue::tags(["a", "b"]), CellValue::tags(["b", "a"]));
        assert_ne!(CellValue::tags(["a"]), CellValue::tags(["a", "a"]));
    }

    #[test]
    fn objects_ignore_key_order() {
        let left = object(json!({"a": 1, "b": {"c": [1, 2], "d": null}}));
        let right = object(json!({"b": {"d": null, "c": [1.0, 2.0]}, "a": 1.0}));
        assert_eq!(left, right);

        let different = object(json!({"a": 1, "b": {"c": [2, 1], "d": null}}));
        assert_ne!(left, different);
    }

    #[test]
    fn objects_with_extra_keys_differ() {
        let left = object(json!({"a": 1}));
        let right = object(json!({"a": 1, "b": 2}));
        assert_ne!(left, right);
        assert_ne!(right, left);
    }

    #[test]
    fn deserializes_plain_json() {
        let values: Vec<CellValue> =
            serde_json::from_str(r#"[null, 3, "x", ["a"], {"k": true}]"#).unwrap();
        assert_eq!(values[0], CellValue::Null);
        assert_eq!(values[1], CellValue::Number(3.0));
        assert_eq!(values[2], CellValue::text("x"));
        assert_eq!(values[3], CellValue::tags(["a"]));
        assert_eq!(values[4], object(json!({"k": true})));
    }

    #[test]
    fn from_json_rejects_mixed_arrays() {
        assert!(CellValue::from_json(json!(["a", 1])).is_none());
        assert_eq!(
            CellValue::from_json(json!(true)),
            Some(CellValue::text("true"))
        );
    }
}
