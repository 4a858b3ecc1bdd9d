use std::fmt;

use serde::Deserialize;

/// Semantic type of a declared column.
///
/// Catalog files may use either the plain names below or the dataframe dtype names used by
/// older catalogs (`str`, `int64`, `float64`, `bool`, `datetime64[ns, <tz>]`). Unknown names
/// fall back to [`ColumnType::String`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Boolean,
    Timestamp,
}

impl ColumnType {
    pub fn parse(name: &str) -> ColumnType {
        let name = name.trim().to_lowercase();

        match name.as_str() {
            "int" | "int64" | "integer" | "bigint" => ColumnType::Integer,
            "float" | "float64" | "double" => ColumnType::Float,
            "bool" | "boolean" => ColumnType::Boolean,
            "timestamp" | "timestamptz" | "datetime" => ColumnType::Timestamp,
            other if other.starts_with("datetime64") => ColumnType::Timestamp,
            _ => ColumnType::String,
        }
    }

    /// Postgres type used for columns of this type.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::String => "text",
            ColumnType::Integer => "bigint",
            ColumnType::Float => "double precision",
            ColumnType::Boolean => "boolean",
            ColumnType::Timestamp => "timestamptz",
        }
    }
}

impl From<String> for ColumnType {
    fn from(value: String) -> Self {
        ColumnType::parse(&value)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_type())
    }
}

/// A declared destination column.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub typ: ColumnType,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, typ: ColumnType) -> Self {
        Self {
            name: name.into(),
            typ,
        }
    }
}

/// Static metadata of one API endpoint.
///
/// Descriptors come from the endpoint catalog and never change during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    /// Endpoint path segment, also the base of the destination table name.
    pub name: String,
    /// Wrapper element holding the items of a page, e.g. `messages`.
    pub plural_key: String,
    /// Element of a single item, e.g. `message`.
    pub singular_key: String,
    /// Query parameter the API filters on for incremental runs, e.g. `start_time`.
    pub api_incremental_key: Option<String>,
    /// Column holding the incremental value in the destination, e.g. `sent_at`.
    pub db_incremental_key: Option<String>,
    /// Ordered declared columns. Only these reach the destination.
    pub columns: Vec<ColumnSchema>,
    /// `limit` query parameter for this endpoint, if it differs from the run default.
    pub page_size: Option<u32>,
    /// Whether the endpoint honors the `page` parameter. Unpaginated endpoints are fetched
    /// from page 1 only.
    pub paginated: bool,
}

impl EndpointDescriptor {
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }
}
