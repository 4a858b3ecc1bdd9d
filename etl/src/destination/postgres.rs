use chrono::{DateTime, Utc};
use config::shared::{BatchConfig, DestinationConfig};
use futures::TryStreamExt;
use pg_escape::quote_identifier;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};

use crate::bail;
use crate::destination::{ColumnFilter, Destination, LoadMode};
use crate::error::{ErrorKind, EtlResult};
use crate::load::parse_timestamp;
use crate::types::{ColumnSchema, ColumnType, TableName, TableRow};

/// Postgres caps the number of bind parameters of a single statement.
const MAX_BIND_PARAMETERS: usize = 65535;

/// Matches text that starts like an ISO date, used to skip placeholders such as `None` or `nan`
/// left in incremental columns by earlier loaders.
const TIMESTAMP_LIKE_PATTERN: &str = r"^\d{4}-\d{2}-\d{2}";

/// Destination writing endpoint tables into a Postgres database.
#[derive(Debug, Clone)]
pub struct PostgresDestination {
    pool: PgPool,
    max_batch_rows: usize,
}

impl PostgresDestination {
    pub fn new(pool: PgPool, batch: &BatchConfig) -> Self {
        Self {
            pool,
            max_batch_rows: batch.max_size.max(1),
        }
    }

    /// Connects a single-connection pool to the configured database.
    pub async fn connect(config: &DestinationConfig, batch: &BatchConfig) -> EtlResult<Self> {
        let pool =
            ::postgres::db::connect_to_destination_database(&config.connection, 1, 1).await?;

        Ok(Self::new(pool, batch))
    }

    /// Rows per insert statement, bounded by the batch size and the bind parameter limit.
    fn rows_per_statement(&self, column_count: usize) -> usize {
        (MAX_BIND_PARAMETERS / column_count.max(1))
            .min(self.max_batch_rows)
            .max(1)
    }

    /// Returns the SQL type of `column`, or `None` when the table has no such column.
    async fn column_type(&self, table: &TableName, column: &str) -> EtlResult<Option<String>> {
        let column_type = sqlx::query_scalar(
            "select format_type(atttypid, atttypmod) from pg_attribute \
             where attrelid = to_regclass($1) and attname = $2 and attnum > 0 and not attisdropped",
        )
        .bind(table.as_quoted_identifier())
        .bind(column)
        .fetch_optional(&self.pool)
        .await?;

        Ok(column_type)
    }

    /// Greatest value of a text column, keeping only values that parse as a timestamp.
    async fn max_text_timestamp(
        &self,
        table: &TableName,
        column: &str,
        filter: Option<&ColumnFilter>,
    ) -> EtlResult<Option<DateTime<Utc>>> {
        let sql = text_candidates_query(table, column, filter);
        let mut query = sqlx::query_scalar::<_, String>(&sql).bind(TIMESTAMP_LIKE_PATTERN);
        if let Some(filter) = filter {
            query = query.bind(filter.value.clone());
        }

        let mut max = None;
        let mut candidates = query.fetch(&self.pool);
        while let Some(candidate) = candidates.try_next().await? {
            match parse_timestamp(candidate.trim()) {
                Some(timestamp) => max = max.max(Some(timestamp)),
                None => debug!(
                    %table,
                    column,
                    value = %candidate,
                    "ignoring unparseable watermark value"
                ),
            }
        }

        Ok(max)
    }

    async fn table_exists(&self, table: &TableName) -> EtlResult<bool> {
        let exists: bool = sqlx::query_scalar("select to_regclass($1) is not null")
            .bind(table.as_quoted_identifier())
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }
}

impl Destination for PostgresDestination {
    fn name() -> &'static str {
        "postgres"
    }

    async fn max_timestamp(
        &self,
        table: &TableName,
        column: &str,
        filter: Option<&ColumnFilter>,
    ) -> EtlResult<Option<DateTime<Utc>>> {
        if !self.table_exists(table).await? {
            debug!(%table, "table does not exist yet, no watermark");
            return Ok(None);
        }

        let Some(column_type) = self.column_type(table, column).await? else {
            bail!(
                ErrorKind::DestinationSchemaMismatch,
                "Incremental column is missing from table",
                format!("column `{column}` of table {table}")
            );
        };

        if !is_timestamp_type(&column_type) {
            return self.max_text_timestamp(table, column, filter).await;
        }

        let sql = max_timestamp_query(table, column, filter);
        let mut query = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(&sql);
        if let Some(filter) = filter {
            query = query.bind(filter.value.clone());
        }

        let max = query.fetch_one(&self.pool).await?;

        Ok(max)
    }

    async fn write_table(
        &self,
        table: &TableName,
        columns: &[ColumnSchema],
        rows: Vec<TableRow>,
        mode: LoadMode,
    ) -> EtlResult<u64> {
        if columns.is_empty() {
            bail!(
                ErrorKind::InvalidData,
                "A table needs at least one column",
                table
            );
        }

        validate_row_widths(columns, &rows)?;

        let table_identifier = table.as_quoted_identifier();
        let column_definitions = columns
            .iter()
            .map(|column| format!("{} {}", quote_identifier(&column.name), column.typ.sql_type()))
            .collect::<Vec<_>>()
            .join(", ");
        let column_list = columns
            .iter()
            .map(|column| quote_identifier(&column.name).to_string())
            .collect::<Vec<_>>()
            .join(", ");

        let mut tx = self.pool.begin().await?;

        match mode {
            LoadMode::Replace => {
                sqlx::query(&format!("drop table if exists {table_identifier}"))
                    .execute(&mut *tx)
                    .await?;
                sqlx::query(&format!(
                    "create table {table_identifier} ({column_definitions})"
                ))
                .execute(&mut *tx)
                .await?;
            }
            LoadMode::Append => {
                sqlx::query(&format!(
                    "create table if not exists {table_identifier} ({column_definitions})"
                ))
                .execute(&mut *tx)
                .await?;
            }
        }

        let mut written = 0;
        for chunk in rows.chunks(self.rows_per_statement(columns.len())) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("insert into {table_identifier} ({column_list}) "));

            builder.push_values(chunk, |mut values, row| {
                for (cell, column) in row.values().iter().zip(columns) {
                    match column.typ {
                        ColumnType::String => values.push_bind(cell.as_str().map(str::to_owned)),
                        ColumnType::Integer => values.push_bind(cell.as_i64()),
                        ColumnType::Float => values.push_bind(cell.as_f64()),
                        ColumnType::Boolean => values.push_bind(cell.as_bool()),
                        ColumnType::Timestamp => values.push_bind(cell.as_timestamp()),
                    };
                }
            });

            let result = builder.build().execute(&mut *tx).await?;
            written += result.rows_affected();
        }

        tx.commit().await?;

        info!(%table, ?mode, rows = written, "wrote rows to postgres table");

        Ok(written)
    }
}

fn is_timestamp_type(column_type: &str) -> bool {
    column_type.starts_with("timestamp") || column_type == "date"
}

/// Builds the watermark query of a timestamp column. `$1` is the optional filter value.
fn max_timestamp_query(table: &TableName, column: &str, filter: Option<&ColumnFilter>) -> String {
    let mut sql = format!(
        "select max({})::timestamptz from {}",
        quote_identifier(column),
        table.as_quoted_identifier()
    );

    if let Some(filter) = filter {
        sql.push_str(&format!(
            " where {}::text = $1",
            quote_identifier(&filter.column)
        ));
    }

    sql
}

/// Builds the query listing the timestamp-like values of a text column. `$1` is the timestamp
/// pattern, `$2` the optional filter value.
fn text_candidates_query(
    table: &TableName,
    column: &str,
    filter: Option<&ColumnFilter>,
) -> String {
    let column = quote_identifier(column);
    let mut sql = format!(
        "select distinct {column}::text from {} where {column}::text ~ $1",
        table.as_quoted_identifier()
    );

    if let Some(filter) = filter {
        sql.push_str(&format!(
            " and {}::text = $2",
            quote_identifier(&filter.column)
        ));
    }

    sql
}

/// Checks that every row has one cell per column before it reaches a statement.
fn validate_row_widths(columns: &[ColumnSchema], rows: &[TableRow]) -> EtlResult<()> {
    if let Some(row) = rows.iter().find(|row| row.values().len() != columns.len()) {
        bail!(
            ErrorKind::InvalidData,
            "Row width does not match the column count",
            format!("expected {} cells, got {}", columns.len(), row.values().len())
        );
    }

    Ok(())
}
