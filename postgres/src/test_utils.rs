use config::shared::{IntoConnectOptions, PgConnectionConfig};
use sqlx::{Connection, Executor, PgConnection, PgPool};

/// A throwaway database created for a single test.
///
/// The database is created on [`PgDatabase::new`] and must be dropped with
/// [`PgDatabase::cleanup`] at the end of the test.
pub struct PgDatabase {
    pub config: PgConnectionConfig,
    pub pool: PgPool,
}

impl PgDatabase {
    /// Creates the database named in `config` and connects a pool to it.
    ///
    /// # Panics
    /// Panics if connection or database creation fails.
    pub async fn new(config: PgConnectionConfig) -> Self {
        let pool = create_pg_database(&config).await;

        Self { config, pool }
    }

    /// Closes the pool and drops the database.
    pub async fn cleanup(self) {
        self.pool.close().await;
        drop_pg_database(&self.config).await;
    }
}

/// Creates a new Postgres database and returns a connection pool to it.
///
/// # Panics
/// Panics if connection or database creation fails.
pub async fn create_pg_database(config: &PgConnectionConfig) -> PgPool {
    let mut connection = PgConnection::connect_with(&config.without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"create database "{}";"#, config.name))
        .await
        .expect("Failed to create database");

    PgPool::connect_with(config.with_db())
        .await
        .expect("Failed to connect to Postgres")
}

/// Drops a Postgres database after terminating its remaining connections.
///
/// Failures are printed and ignored so that cleanup never fails a test.
pub async fn drop_pg_database(config: &PgConnectionConfig) {
    let mut connection = match PgConnection::connect_with(&config.without_db()).await {
        Ok(connection) => connection,
        Err(e) => {
            eprintln!("warning: failed to connect to Postgres for cleanup: {e}");
            return;
        }
    };

    if let Err(e) = connection
        .execute(&*format!(
            r#"
            select pg_terminate_backend(pg_stat_activity.pid)
            from pg_stat_activity
            where pg_stat_activity.datname = '{}'
            and pid <> pg_backend_pid();"#,
            config.name
        ))
        .await
    {
        eprintln!(
            "warning: failed to terminate connections for database {}: {}",
            config.name, e
        );
    }

    if let Err(e) = connection
        .execute(&*format!(r#"drop database if exists "{}";"#, config.name))
        .await
    {
        eprintln!("warning: failed to drop database {}: {}", config.name, e);
    }
}
