use chrono::{DateTime, TimeZone, Utc};
use config::shared::BatchConfig;
use etl::destination::{ColumnFilter, Destination, LoadMode};
use etl::load::Loader;
use etl::test_utils::database::{TEST_DATABASE_SCHEMA, spawn_destination_database};
use etl::test_utils::fixtures::messages_endpoint;
use etl::types::{Cell, ColumnSchema, ColumnType, Record, RecordBatch, TableName, TableRow};
use sqlx::Row;
use telemetry::init_test_tracing;

fn columns() -> Vec<ColumnSchema> {
    vec![
        ColumnSchema::new("id", ColumnType::Integer),
        ColumnSchema::new("campaign_id", ColumnType::String),
        ColumnSchema::new("sent_at", ColumnType::Timestamp),
        ColumnSchema::new("opted_in", ColumnType::Boolean),
    ]
}

fn day(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
}

fn row(id: i64, campaign: &str, sent_at: u32) -> TableRow {
    TableRow::new(vec![
        Cell::I64(id),
        Cell::String(campaign.to_string()),
        Cell::TimestampTz(day(sent_at)),
        Cell::Bool(id % 2 == 0),
    ])
}

fn table() -> TableName {
    TableName::for_endpoint(TEST_DATABASE_SCHEMA, "mc", "sent_messages")
}

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn replace_recreates_and_append_extends_the_table() {
    init_test_tracing();
    let (database, destination) = spawn_destination_database(&BatchConfig { max_size: 2 }).await;

    let written = destination
        .write_table(
            &table(),
            &columns(),
            vec![row(1, "42", 1), row(2, "42", 2), row(3, "7", 3)],
            LoadMode::Replace,
        )
        .await
        .unwrap();
    assert_eq!(written, 3);

    destination
        .write_table(&table(), &columns(), vec![row(4, "7", 4)], LoadMode::Append)
        .await
        .unwrap();

    let count: i64 = sqlx::query_scalar(&format!("select count(*) from {}", table()))
        .fetch_one(&database.pool)
        .await
        .unwrap();
    assert_eq!(count, 4);

    destination
        .write_table(&table(), &columns(), vec![row(5, "42", 5)], LoadMode::Replace)
        .await
        .unwrap();

    let ids: Vec<i64> = sqlx::query_scalar(&format!("select id from {} order by id", table()))
        .fetch_all(&database.pool)
        .await
        .unwrap();
    assert_eq!(ids, vec![5]);

    database.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn max_timestamp_is_scoped_by_filter() {
    init_test_tracing();
    let (database, destination) = spawn_destination_database(&BatchConfig::default()).await;

    let missing = destination
        .max_timestamp(&table(), "sent_at", None)
        .await
        .unwrap();
    assert_eq!(missing, None);

    destination
        .write_table(
            &table(),
            &columns(),
            vec![row(1, "42", 3), row(2, "7", 9), row(3, "42", 5)],
            LoadMode::Replace,
        )
        .await
        .unwrap();

    let filter = ColumnFilter {
        column: "campaign_id".to_string(),
        value: "42".to_string(),
    };
    let scoped = destination
        .max_timestamp(&table(), "sent_at", Some(&filter))
        .await
        .unwrap();
    let overall = destination
        .max_timestamp(&table(), "sent_at", None)
        .await
        .unwrap();

    assert_eq!(scoped, Some(day(5)));
    assert_eq!(overall, Some(day(9)));

    database.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn max_timestamp_skips_placeholder_and_invalid_text() {
    init_test_tracing();
    let (database, destination) = spawn_destination_database(&BatchConfig::default()).await;
    let table = TableName::for_endpoint(TEST_DATABASE_SCHEMA, "mc", "legacy_messages");

    sqlx::query(&format!(
        "create table {table} (id bigint, received_at text)"
    ))
    .execute(&database.pool)
    .await
    .unwrap();
    sqlx::query(&format!(
        "insert into {table} values (1, '2024-01-02 03:04:05+00'), (2, 'None'), (3, 'nan'), (4, null), \
         (5, '2024-13-01'), (6, '2024-02-30 10:00:00')"
    ))
    .execute(&database.pool)
    .await
    .unwrap();

    let max = destination
        .max_timestamp(&table, "received_at", None)
        .await
        .unwrap();

    assert_eq!(max, Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()));

    database.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a Postgres database"]
async fn loader_writes_typed_columns() {
    init_test_tracing();
    let (database, destination) = spawn_destination_database(&BatchConfig::default()).await;
    let endpoint = messages_endpoint();
    let table = TableName::for_endpoint(TEST_DATABASE_SCHEMA, "mc", &endpoint.name);

    let records: Vec<Record> = vec![
        [
            ("id", "10"),
            ("body", "hello"),
            ("received_at", "2024-01-02 03:04:05 UTC"),
            ("campaign_id", "42"),
        ],
        [
            ("id", "11"),
            ("body", ""),
            ("received_at", "2024-01-03T00:00:00Z"),
            ("campaign_id", "42"),
        ],
    ]
    .into_iter()
    .map(|pairs| {
        pairs
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    })
    .collect();

    let summary = Loader::new(&destination)
        .load(
            &table,
            &endpoint,
            LoadMode::Replace,
            RecordBatch::from_records(records),
        )
        .await
        .unwrap();
    assert_eq!(summary.rows, 2);

    let rows = sqlx::query(&format!(
        "select id, body, received_at, campaign_id from {table} order by id"
    ))
    .fetch_all(&database.pool)
    .await
    .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get::<i64, _>("id"), 10);
    assert_eq!(rows[0].get::<Option<String>, _>("body").as_deref(), Some("hello"));
    assert_eq!(
        rows[0].get::<DateTime<Utc>, _>("received_at"),
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    );
    assert_eq!(rows[1].get::<String, _>("campaign_id"), "42");

    let watermark = destination
        .max_timestamp(
            &table,
            "received_at",
            Some(&ColumnFilter {
                column: "campaign_id".to_string(),
                value: "42".to_string(),
            }),
        )
        .await
        .unwrap();
    assert_eq!(watermark, Some(Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap()));

    database.cleanup().await;
}
