use config::shared::{BatchConfig, PgConnectionConfig, TlsConfig};
use postgres::test_utils::PgDatabase;
use uuid::Uuid;

use crate::destination::postgres::PostgresDestination;

/// Schema that destination tables are created in during tests.
pub const TEST_DATABASE_SCHEMA: &str = "mobile_commons";

/// Generates connection settings for a fresh, uniquely named local database.
///
/// Configuration is read from environment variables:
/// - `TESTS_DATABASE_HOST`: Postgres server hostname (required)
/// - `TESTS_DATABASE_PORT`: Postgres server port (required)
/// - `TESTS_DATABASE_USERNAME`: Database user (required)
/// - `TESTS_DATABASE_PASSWORD`: Database password (optional)
pub fn local_pg_connection_config() -> PgConnectionConfig {
    PgConnectionConfig {
        host: std::env::var("TESTS_DATABASE_HOST").expect("TESTS_DATABASE_HOST must be set"),
        port: std::env::var("TESTS_DATABASE_PORT")
            .expect("TESTS_DATABASE_PORT must be set")
            .parse()
            .expect("TESTS_DATABASE_PORT must be a valid port number"),
        name: Uuid::new_v4().to_string(),
        username: std::env::var("TESTS_DATABASE_USERNAME")
            .expect("TESTS_DATABASE_USERNAME must be set"),
        password: std::env::var("TESTS_DATABASE_PASSWORD")
            .ok()
            .map(Into::into),
        tls: TlsConfig {
            trusted_root_certs: String::new(),
            enabled: false,
        },
    }
}

/// Creates a new database with the test schema and a destination writing into it.
///
/// # Panics
///
/// Panics if the database or the test schema cannot be created.
pub async fn spawn_destination_database(batch: &BatchConfig) -> (PgDatabase, PostgresDestination) {
    let database = PgDatabase::new(local_pg_connection_config()).await;

    sqlx::query(&format!("create schema {TEST_DATABASE_SCHEMA}"))
        .execute(&database.pool)
        .await
        .expect("Failed to create test schema");

    let destination = PostgresDestination::new(database.pool.clone(), batch);

    (database, destination)
}
