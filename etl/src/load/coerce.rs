use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::types::{Cell, ColumnType};

/// Text values that stand for a missing value in typed columns of API payloads and earlier
/// loads.
const NULL_PLACEHOLDERS: [&str; 5] = ["", "None", "nan", "NaN", "null"];

/// Naive timestamp layouts accepted besides RFC 3339, interpreted as UTC.
const NAIVE_TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Zone suffixes the API appends to UTC timestamps.
const UTC_SUFFIXES: [&str; 2] = [" UTC", " GMT"];

/// Returns `true` when `value` should be stored as a null in a column of type `typ`.
///
/// Text columns keep placeholder words such as `None` verbatim, only empty values are nulls.
pub fn is_null_placeholder(value: &str, typ: ColumnType) -> bool {
    let value = value.trim();

    match typ {
        ColumnType::String => value.is_empty(),
        _ => NULL_PLACEHOLDERS.contains(&value),
    }
}

/// Converts the raw text of `column` into a cell of the declared type.
///
/// Missing values and null placeholders of the declared type become [`Cell::Null`]. Values that cannot be read as
/// the declared type fail with [`ErrorKind::ConversionError`].
pub fn coerce_cell(column: &str, typ: ColumnType, raw: Option<&str>) -> EtlResult<Cell> {
    let Some(raw) = raw else {
        return Ok(Cell::Null);
    };

    if is_null_placeholder(raw, typ) {
        return Ok(Cell::Null);
    }

    let value = raw.trim();
    let cell = match typ {
        ColumnType::String => Some(Cell::String(raw.to_string())),
        ColumnType::Integer => parse_integer(value).map(Cell::I64),
        ColumnType::Float => value.parse::<f64>().ok().map(Cell::F64),
        ColumnType::Boolean => parse_bool(value).map(Cell::Bool),
        ColumnType::Timestamp => parse_timestamp(value).map(Cell::TimestampTz),
    };

    match cell {
        Some(cell) => Ok(cell),
        None => bail!(
            ErrorKind::ConversionError,
            "Value does not match the declared column type",
            format!("column `{column}` declared as {typ} got `{raw}`")
        ),
    }
}

/// Accepts plain integers as well as integral floats such as `12.0`.
fn parse_integer(value: &str) -> Option<i64> {
    if let Ok(integer) = value.parse::<i64>() {
        return Some(integer);
    }

    let float = value.parse::<f64>().ok()?;
    if float.is_finite() && float.fract() == 0.0 && float.abs() < i64::MAX as f64 {
        return Some(float as i64);
    }

    None
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Some(true),
        "false" | "f" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// Parses the timestamp layouts the API is known to return and normalizes them to UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.with_timezone(&Utc));
    }

    let value = UTC_SUFFIXES
        .iter()
        .find_map(|suffix| value.strip_suffix(suffix))
        .unwrap_or(value);

    if let Ok(timestamp) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f %z") {
        return Some(timestamp.with_timezone(&Utc));
    }

    // Postgres renders timestamptz as text with a bare hour offset, e.g. `+00`.
    if let Ok(timestamp) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(timestamp.with_timezone(&Utc));
    }

    for format in NAIVE_TIMESTAMP_FORMATS {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(value, format) {
            return Some(timestamp.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|timestamp| timestamp.and_utc())
}
