//! Per-column-type validation applied when a cell value is committed.
//!
//! Numeric columns check the numeric-text grammar and normalize the value;
//! object columns accept an object or JSON text describing one. Other
//! column types pass through unchanged.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::domain::entities::cell::CellValue;
use crate::domain::entities::column::{ColumnDefinition, ColumnType};
use crate::error::{StructuralError, ValidationError};

static NUMBER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?[0-9]*\.?[0-9]+$|^-?[0-9]+\.?[0-9]*$").expect("valid number regex")
});

static ZERO_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0+\.?0*$").expect("valid zero regex"));

/// A value ready to store, plus keys that repeated in object text.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    pub value: CellValue,
    /// The last occurrence of each of these keys was kept.
    pub duplicate_keys: Vec<String>,
}

/// Validates `value` for `column` and returns the value to store.
pub fn validate(column: &ColumnDefinition, value: CellValue) -> Result<CellValue, ValidationError> {
    validate_with_warnings(column, value).map(|validated| validated.value)
}

/// Like [`validate`], but also reports duplicate keys found in object text.
pub fn validate_with_warnings(
    column: &ColumnDefinition,
    value: CellValue,
) -> Result<Validated, ValidationError> {
    let (value, duplicate_keys) = match column.kind {
        ColumnType::Number => {
            validate_number(&value)?;
            (normalize_number(value, column), Vec::new())
        }
        ColumnType::Object => coerce_object(value)?,
        _ => (value, Vec::new()),
    };
    Ok(Validated {
        value,
        duplicate_keys,
    })
}

/// Null and blank text are accepted as "no value".
pub fn validate_number(value: &CellValue) -> Result<(), ValidationError> {
    match value {
        CellValue::Null => Ok(()),
        CellValue::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Ok(());
            }
            if !NUMBER_REGEX.is_match(trimmed) {
                return Err(ValidationError::NotANumber);
            }
            match trimmed.parse::<f64>() {
                Ok(parsed) if parsed.is_finite() => Ok(()),
                _ => Err(ValidationError::NotANumber),
            }
        }
        CellValue::Number(number) if number.is_finite() => Ok(()),
        _ => Err(ValidationError::NotANumber),
    }
}

/// Turns an already validated numeric value into its stored form.
///
/// Numeric text becomes a number, blank text becomes null, then the
/// column's `is_integer` or `precision` rounding is applied.
pub fn normalize_number(value: CellValue, column: &ColumnDefinition) -> CellValue {
    let number = match value {
        CellValue::Number(number) => number,
        CellValue::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return CellValue::Null;
            }
            if ZERO_REGEX.is_match(trimmed) {
                0.0
            } else {
                match trimmed.parse::<f64>() {
                    Ok(parsed) => parsed,
                    Err(_) => return CellValue::Text(text),
                }
            }
        }
        other => return other,
    };

    CellValue::Number(round_for_column(number, column))
}

fn round_for_column(number: f64, column: &ColumnDefinition) -> f64 {
    if column.is_integer {
        return number.round();
    }
    match column.precision {
        Some(precision) => {
            let factor = 10_f64.powi(precision.min(15) as i32);
            let scaled = number * factor;
            if !scaled.is_finite() {
                return number;
            }
            scaled.round() / factor
        }
        None => number,
    }
}

fn coerce_object(value: CellValue) -> Result<(CellValue, Vec<String>), StructuralError> {
    match value {
        CellValue::Object(_) | CellValue::Null => Ok((value, Vec::new())),
        CellValue::Text(text) => parse_object_text(&text)
            .map(|parsed| (CellValue::Object(parsed.value), parsed.duplicate_keys)),
        other => Err(StructuralError::NotAnObject { found: other.kind() }),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedObject {
    pub value: Map<String, Value>,
    /// Keys repeated inside the same object; the last occurrence wins.
    pub duplicate_keys: Vec<String>,
}

/// Parses JSON text that must describe an object.
pub fn parse_object_text(text: &str) -> Result<ParsedObject, StructuralError> {
    let parsed: Value =
        serde_json::from_str(text).map_err(|err| StructuralError::InvalidJson(err.to_string()))?;

    match parsed {
        Value::Object(value) => Ok(ParsedObject {
            value,
            duplicate_keys: find_duplicate_keys(text),
        }),
        Value::Array(_) => Err(StructuralError::NotAnObject { found: "array" }),
        Value::Null => Err(StructuralError::NotAnObject { found: "null" }),
        Value::Bool(_) => Err(StructuralError::NotAnObject { found: "boolean" }),
        Value::Number(_) => Err(StructuralError::NotAnObject { found: "number" }),
        Value::String(_) => Err(StructuralError::NotAnObject { found: "string" }),
    }
}

enum Frame {
    Object {
        keys: HashSet<String>,
        expect_key: bool,
    },
    Array,
}

/// Scans JSON text token by token and reports keys that repeat within one
/// object. Nesting is tracked by brackets, so layout and multi-line string
/// values do not matter.
pub fn find_duplicate_keys(text: &str) -> Vec<String> {
    let mut stack: Vec<Frame> = Vec::new();
    let mut duplicates: Vec<String> = Vec::new();
    let mut chars = text.char_indices();

    while let Some((start, ch)) = chars.next() {
        match ch {
            '{' => stack.push(Frame::Object {
                keys: HashSet::new(),
                expect_key: true,
            }),
            '[' => stack.push(Frame::Array),
            '}' | ']' => {
                stack.pop();
            }
            ',' => {
                if let Some(Frame::Object { expect_key, .. }) = stack.last_mut() {
                    *expect_key = true;
                }
            }
            ':' => {
                if let Some(Frame::Object { expect_key, .. }) = stack.last_mut() {
                    *expect_key = false;
                }
            }
            '"' => {
                let mut end = text.len();
                let mut escaped = false;
                for (idx, inner) in chars.by_ref() {
                    if escaped {
                        escaped = false;
                    } else if inner == '\\' {
                        escaped = true;
                    } else if inner == '"' {
                        end = idx + 1;
                        break;
                    }
                }

                if let Some(Frame::Object {
                    keys,
                    expect_key: true,
                }) = stack.last_mut()
                {
                    let raw = &text[start..end];
                    let key = serde_json::from_str::<String>(raw)
                        .unwrap_or_else(|_| raw.trim_matches('"').to_string());
                    if !keys.insert(key.clone()) && !duplicates.contains(&key) {
                        duplicates.push(key);
                    }
                }
            }
            _ => {}
        }
    }

    duplicates
}
