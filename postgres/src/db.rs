use config::shared::{IntoConnectOptions, PgConnectionConfig};
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::info;

/// Connects to the destination database with a bounded connection pool.
///
/// A single extraction run writes one table at a time, so callers usually ask for one
/// connection.
pub async fn connect_to_destination_database(
    config: &PgConnectionConfig,
    min_connections: u32,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    let options: PgConnectOptions = config.with_db();

    info!(
        host = %config.host,
        database = %config.name,
        "connecting to destination database"
    );

    PgPoolOptions::new()
        .min_connections(min_connections)
        .max_connections(max_connections)
        .connect_with(options)
        .await
}
