//! Text rendering of cell values for terminal output.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::domain::entities::cell::CellValue;
use crate::domain::entities::column::{ColumnDefinition, ColumnType};

const EMPTY_CELL: &str = "-";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_cell_value(column: &ColumnDefinition, value: &CellValue) -> String {
    match value {
        CellValue::Null => EMPTY_CELL.to_string(),
        CellValue::Number(number) => format_number(column, *number),
        CellValue::Text(text) if column.kind == ColumnType::Timestamp => format_timestamp(text),
        CellValue::Text(text) => text.clone(),
        CellValue::Tags(_) | CellValue::Object(_) => {
            serde_json::to_string_pretty(&value.to_json()).unwrap_or_else(|_| value.to_string())
        }
    }
}

fn format_number(column: &ColumnDefinition, number: f64) -> String {
    if column.is_integer {
        return format!("{number:.0}");
    }
    match column.precision {
        Some(precision) => format!("{number:.prec$}", prec = precision as usize),
        None => number.to_string(),
    }
}

/// Falls back to the raw text when it is not a recognizable timestamp.
fn format_timestamp(text: &str) -> String {
    let trimmed = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return parsed.naive_local().format(TIMESTAMP_FORMAT).to_string();
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT) {
        return parsed.format(TIMESTAMP_FORMAT).to_string();
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(midnight) = parsed.and_hms_opt(0, 0, 0) {
            return midnight.format(TIMESTAMP_FORMAT).to_string();
        }
    }
    text.to_string()
}
