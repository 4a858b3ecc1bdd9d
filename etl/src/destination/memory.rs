use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::info;

use crate::bail;
use crate::destination::{ColumnFilter, Destination, LoadMode};
use crate::error::{ErrorKind, EtlResult};
use crate::types::{Cell, ColumnSchema, TableName, TableRow};

/// Contents of one in-memory table.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryTable {
    pub columns: Vec<ColumnSchema>,
    pub rows: Vec<TableRow>,
}

impl MemoryTable {
    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<TableName, MemoryTable>,
    writes: Vec<(TableName, LoadMode, u64)>,
}

/// In-memory destination used by tests and dry runs.
///
/// Tables live only as long as the process. Clones share the same tables.
#[derive(Debug, Clone)]
pub struct MemoryDestination {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDestination {
    /// Creates a new destination without tables.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Returns a copy of a table, if it was ever written.
    pub async fn table(&self, table: &TableName) -> Option<MemoryTable> {
        let inner = self.inner.lock().await;
        inner.tables.get(table).cloned()
    }

    /// Returns the rows of a table, empty if it does not exist.
    pub async fn table_rows(&self, table: &TableName) -> Vec<TableRow> {
        self.table(table)
            .await
            .map(|table| table.rows)
            .unwrap_or_default()
    }

    /// Returns every write in the order it happened, with its mode and row count.
    pub async fn writes(&self) -> Vec<(TableName, LoadMode, u64)> {
        let inner = self.inner.lock().await;
        inner.writes.clone()
    }
}

impl Default for MemoryDestination {
    fn default() -> Self {
        Self::new()
    }
}

impl Destination for MemoryDestination {
    fn name() -> &'static str {
        "memory"
    }

    async fn max_timestamp(
        &self,
        table: &TableName,
        column: &str,
        filter: Option<&ColumnFilter>,
    ) -> EtlResult<Option<DateTime<Utc>>> {
        let inner = self.inner.lock().await;

        let Some(stored) = inner.tables.get(table) else {
            return Ok(None);
        };

        let Some(column_index) = stored.column_index(column) else {
            bail!(
                ErrorKind::DestinationSchemaMismatch,
                "Incremental column is missing from table",
                format!("column `{column}` of table {table}")
            );
        };

        let filter_index = match filter {
            Some(filter) => match stored.column_index(&filter.column) {
                Some(index) => Some((index, filter.value.as_str())),
                None => bail!(
                    ErrorKind::DestinationSchemaMismatch,
                    "Filter column is missing from table",
                    format!("column `{}` of table {table}", filter.column)
                ),
            },
            None => None,
        };

        let max = stored
            .rows
            .iter()
            .filter(|row| match filter_index {
                Some((index, value)) => {
                    row.values()[index].to_text().as_deref() == Some(value)
                }
                None => true,
            })
            .filter_map(|row| timestamp_of(&row.values()[column_index]))
            .max();

        Ok(max)
    }

    async fn write_table(
        &self,
        table: &TableName,
        columns: &[ColumnSchema],
        rows: Vec<TableRow>,
        mode: LoadMode,
    ) -> EtlResult<u64> {
        let mut inner = self.inner.lock().await;
        let count = rows.len() as u64;

        info!(%table, ?mode, rows = count, "writing rows to memory table");

        match mode {
            LoadMode::Replace => {
                inner.tables.insert(
                    table.clone(),
                    MemoryTable {
                        columns: columns.to_vec(),
                        rows,
                    },
                );
            }
            LoadMode::Append => {
                let stored = inner
                    .tables
                    .entry(table.clone())
                    .or_insert_with(|| MemoryTable {
                        columns: columns.to_vec(),
                        rows: Vec::new(),
                    });

                if stored.columns != columns {
                    bail!(
                        ErrorKind::DestinationSchemaMismatch,
                        "Appended columns differ from the table columns",
                        table
                    );
                }

                stored.rows.extend(rows);
            }
        }

        inner.writes.push((table.clone(), mode, count));

        Ok(count)
    }
}

/// Reads a stored cell as a timestamp, accepting text that parses as RFC 3339.
fn timestamp_of(cell: &Cell) -> Option<DateTime<Utc>> {
    match cell {
        Cell::TimestampTz(value) => Some(*value),
        Cell::String(value) => DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|value| value.with_timezone(&Utc)),
        _ => None,
    }
}
