use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::EtlResult;
use crate::types::{ColumnSchema, TableName, TableRow};

/// How a write treats rows already present in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Drop and recreate the table, then insert. Readers never see a partially replaced table.
    Replace,
    /// Create the table if missing, then insert. Existing rows are untouched.
    Append,
}

/// Equality filter on a column, compared on the column's text form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFilter {
    pub column: String,
    pub value: String,
}

/// Relational store that extracted endpoints are landed into.
///
/// A destination answers the watermark query of incremental runs and persists typed rows.
/// Every write is atomic: either all rows of a call become visible or none do.
pub trait Destination {
    /// Returns the name of the destination.
    fn name() -> &'static str;

    /// Returns the greatest timestamp stored in `column`, optionally restricted by `filter`.
    ///
    /// Values that cannot be read as a timestamp are ignored. A missing table or a table
    /// without qualifying rows yields `None`.
    fn max_timestamp(
        &self,
        table: &TableName,
        column: &str,
        filter: Option<&ColumnFilter>,
    ) -> impl Future<Output = EtlResult<Option<DateTime<Utc>>>> + Send;

    /// Writes `rows` into `table`, whose columns are exactly `columns`.
    ///
    /// Returns the number of rows written.
    fn write_table(
        &self,
        table: &TableName,
        columns: &[ColumnSchema],
        rows: Vec<TableRow>,
        mode: LoadMode,
    ) -> impl Future<Output = EtlResult<u64>> + Send;
}
