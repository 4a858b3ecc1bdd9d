use chrono::{DateTime, Utc};

/// A typed value ready to be written to the destination.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    String(String),
    I64(i64),
    F64(f64),
    Bool(bool),
    TimestampTz(DateTime<Utc>),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::I64(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::F64(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Cell::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Cell::TimestampTz(value) => Some(*value),
            _ => None,
        }
    }

    /// Text form of the value, as Postgres would render it with `::text`.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::String(value) => Some(value.clone()),
            Cell::I64(value) => Some(value.to_string()),
            Cell::F64(value) => Some(value.to_string()),
            Cell::Bool(value) => Some(value.to_string()),
            Cell::TimestampTz(value) => Some(value.to_rfc3339()),
        }
    }
}

/// A row of typed cells, ordered like the declared columns of its endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    values: Vec<Cell>,
}

impl TableRow {
    pub fn new(values: Vec<Cell>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Cell] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Cell> {
        self.values
    }
}
