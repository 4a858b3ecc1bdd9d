use tracing::info;

use crate::destination::{Destination, LoadMode};
use crate::error::EtlResult;
use crate::load::coerce::coerce_cell;
use crate::types::{ColumnSchema, EndpointDescriptor, RecordBatch, TableName, TableRow};

/// Result of one load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub table: TableName,
    pub mode: LoadMode,
    pub rows: u64,
}

/// Persists record batches with the declared column types of their endpoint.
#[derive(Debug)]
pub struct Loader<'a, D> {
    destination: &'a D,
}

impl<'a, D> Loader<'a, D>
where
    D: Destination,
{
    pub fn new(destination: &'a D) -> Self {
        Self { destination }
    }

    /// Coerces `batch` to the declared columns of `endpoint` and writes it to `table`.
    ///
    /// The table always has every declared column, in declaration order, whether or not the
    /// batch saw it. Nothing is written when a single cell fails to convert.
    pub async fn load(
        &self,
        table: &TableName,
        endpoint: &EndpointDescriptor,
        mode: LoadMode,
        batch: RecordBatch,
    ) -> EtlResult<LoadSummary> {
        let rows = to_table_rows(&endpoint.columns, batch)?;
        let row_count = rows.len();

        let written = self
            .destination
            .write_table(table, &endpoint.columns, rows, mode)
            .await?;

        info!(
            endpoint = %endpoint.name,
            %table,
            ?mode,
            rows = row_count,
            destination = D::name(),
            "loaded endpoint"
        );

        Ok(LoadSummary {
            table: table.clone(),
            mode,
            rows: written,
        })
    }
}

/// Converts every record into a row with one typed cell per declared column.
pub fn to_table_rows(columns: &[ColumnSchema], batch: RecordBatch) -> EtlResult<Vec<TableRow>> {
    batch
        .into_rows()
        .into_iter()
        .map(|record| {
            let values = columns
                .iter()
                .map(|column| {
                    coerce_cell(
                        &column.name,
                        column.typ,
                        record.get(&column.name).map(String::as_str),
                    )
                })
                .collect::<EtlResult<Vec<_>>>()?;

            Ok(TableRow::new(values))
        })
        .collect()
}
