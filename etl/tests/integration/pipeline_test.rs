use std::sync::{Arc, OnceLock};

use chrono::{DateTime, TimeZone, Utc};
use config::shared::{ExtractionConfig, PageRetryConfig, RetryConfig};
use etl::concurrency::shutdown::ShutdownTx;
use etl::destination::memory::MemoryDestination;
use etl::destination::{Destination, LoadMode};
use etl::error::{ErrorKind, EtlResult};
use etl::etl_error;
use etl::pipeline::{Pipeline, PipelineConfig};
use etl::source::PageRequest;
use etl::test_utils::fixtures::{
    item_xml, messages_endpoint, page_xml, paged_responder, profiles_endpoint,
};
use etl::test_utils::source::ScriptedSource;
use etl::types::{Cell, MissingKeyPolicy, ParentParam, TableName, TableRow};
use telemetry::init_test_tracing;

fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        extraction: ExtractionConfig {
            page_retry: PageRetryConfig {
                max_attempts: 5,
                delay_ms: 1,
            },
            ..ExtractionConfig::default()
        },
        probe_retry: RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 1,
            backoff_multiplier: 1.0,
        },
        schema: "mobile_commons".to_string(),
        table_prefix: "mc".to_string(),
        missing_key_policy: MissingKeyPolicy::ForceFullRebuild,
    }
}

fn messages_table() -> TableName {
    TableName::for_endpoint("mobile_commons", "mc", "messages")
}

fn timestamp(month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, month, day, 0, 0, 0).unwrap()
}

/// Answers `messages` requests with `pages` single-row pages per campaign.
fn campaign_messages(request: &PageRequest) -> EtlResult<String> {
    let campaign = request.param("campaign_id").unwrap_or_default();
    let pages = match campaign {
        "42" => 3,
        "7" => 2,
        "13" => {
            return Err(etl_error!(
                ErrorKind::SourceClientError,
                "Campaign is not accessible"
            ));
        }
        _ => 0,
    };

    let items = if request.page <= pages {
        vec![item_xml(
            "message",
            &[
                ("id", format!("{campaign}{:03}", request.page)),
                ("body", format!("campaign {campaign} page {}", request.page)),
                ("received_at", "2024-05-01T10:00:00Z".to_string()),
            ],
        )]
    } else {
        Vec::new()
    };

    Ok(page_xml("messages", &items, None))
}

async fn seed_messages(destination: &MemoryDestination, rows: &[(i64, &str, DateTime<Utc>)]) {
    let rows = rows
        .iter()
        .map(|(id, campaign, received_at)| {
            TableRow::new(vec![
                Cell::I64(*id),
                Cell::String("seeded".to_string()),
                Cell::TimestampTz(*received_at),
                Cell::String(campaign.to_string()),
            ])
        })
        .collect();

    destination
        .write_table(
            &messages_table(),
            &messages_endpoint().columns,
            rows,
            LoadMode::Append,
        )
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn full_rebuild_replaces_child_table_once_for_all_parents() {
    init_test_tracing();
    let destination = MemoryDestination::new();
    seed_messages(&destination, &[(1, "42", timestamp(1, 1))]).await;
    let source = ScriptedSource::new(campaign_messages);
    let pipeline = Pipeline::new(pipeline_config(), source.clone(), destination.clone());

    let summary = pipeline
        .run_for_parents(
            messages_endpoint(),
            true,
            ParentParam::CampaignId,
            &["42".to_string(), "7".to_string()],
        )
        .await
        .unwrap();

    assert_eq!(summary.sessions, 2);
    assert_eq!(summary.pages, 5);
    assert_eq!(summary.rows_loaded, 5);

    let writes = destination.writes().await;
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[1], (messages_table(), LoadMode::Replace, 5));

    let rows = destination.table_rows(&messages_table()).await;
    assert_eq!(rows.len(), 5);
    for row in rows {
        let id = row.values()[0].as_i64().unwrap().to_string();
        let campaign = row.values()[3].as_str().unwrap();
        assert!(id.starts_with(campaign));
    }

    assert!(
        source
            .requests()
            .iter()
            .all(|request| request.param("start_time").is_none())
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn incremental_run_sends_parent_scoped_watermark() {
    init_test_tracing();
    let destination = MemoryDestination::new();
    seed_messages(
        &destination,
        &[
            (1, "42", timestamp(1, 1)),
            (2, "7", timestamp(3, 1)),
            (3, "42", timestamp(1, 1)),
        ],
    )
    .await;
    let source = ScriptedSource::new(campaign_messages);
    let pipeline = Pipeline::new(pipeline_config(), source.clone(), destination.clone());

    let summary = pipeline
        .run_for_parents(
            messages_endpoint(),
            false,
            ParentParam::CampaignId,
            &["42".to_string()],
        )
        .await
        .unwrap();

    let requests = source.requests();
    assert!(!requests.is_empty());
    for request in &requests {
        assert_eq!(request.param("campaign_id"), Some("42"));
        assert_eq!(request.param("start_time"), Some("2024-01-01T00:00:00Z"));
    }

    assert_eq!(summary.load.map(|load| load.mode), Some(LoadMode::Append));
    assert_eq!(destination.table_rows(&messages_table()).await.len(), 3 + 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_parent_aborts_the_load() {
    init_test_tracing();
    let destination = MemoryDestination::new();
    let pipeline = Pipeline::new(
        pipeline_config(),
        ScriptedSource::new(campaign_messages),
        destination.clone(),
    );

    let err = pipeline
        .run_for_parents(
            messages_endpoint(),
            true,
            ParentParam::CampaignId,
            &["42".to_string(), "13".to_string()],
        )
        .await
        .unwrap_err();

    assert_eq!(err.kinds(), vec![ErrorKind::SourceClientError]);
    assert!(destination.writes().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn endpoint_without_pages_is_not_loaded() {
    init_test_tracing();
    let endpoint = profiles_endpoint();
    let destination = MemoryDestination::new();
    let source = ScriptedSource::new(paged_responder(&endpoint, 0, 1, false));
    let pipeline = Pipeline::new(pipeline_config(), source.clone(), destination.clone());

    let summary = pipeline.run(endpoint, false).await.unwrap();

    assert_eq!(summary.pages, 0);
    assert!(summary.load.is_none());
    assert_eq!(source.requests().len(), 1);
    assert!(destination.writes().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn endpoint_without_incremental_key_is_rebuilt() {
    init_test_tracing();
    let endpoint = profiles_endpoint();
    let destination = MemoryDestination::new();
    let source = ScriptedSource::new(paged_responder(&endpoint, 37, 2, false));
    let pipeline = Pipeline::new(pipeline_config(), source.clone(), destination.clone());

    let summary = pipeline.run(endpoint, false).await.unwrap();

    assert_eq!(summary.pages, 37);
    assert_eq!(summary.rows_loaded, 74);
    assert_eq!(summary.report.failed, 0);
    assert_eq!(summary.load.map(|load| load.mode), Some(LoadMode::Replace));
    assert!(
        source
            .requests()
            .iter()
            .all(|request| request.param("limit") == Some("1000"))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_before_run_fails_without_requests() {
    init_test_tracing();
    let endpoint = profiles_endpoint();
    let destination = MemoryDestination::new();
    let source = ScriptedSource::new(paged_responder(&endpoint, 4, 1, false));
    let pipeline = Pipeline::new(pipeline_config(), source.clone(), destination.clone());

    pipeline.shutdown_tx().shutdown().unwrap();
    let err = pipeline.run(endpoint, true).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert!(source.requests().is_empty());
    assert!(destination.writes().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_stops_remaining_parents() {
    init_test_tracing();
    let destination = MemoryDestination::new();
    let shutdown: Arc<OnceLock<ShutdownTx>> = Arc::new(OnceLock::new());
    let source = {
        let shutdown = shutdown.clone();
        ScriptedSource::new(move |request| {
            // Ctrl+C arrives while the first parent is being fetched.
            if let Some(shutdown_tx) = shutdown.get() {
                shutdown_tx.shutdown().unwrap();
            }
            campaign_messages(request)
        })
    };
    let pipeline = Pipeline::new(pipeline_config(), source.clone(), destination.clone());
    shutdown.set(pipeline.shutdown_tx()).unwrap();

    let err = pipeline
        .run_for_parents(
            messages_endpoint(),
            true,
            ParentParam::CampaignId,
            &["42".to_string(), "7".to_string(), "13".to_string()],
        )
        .await
        .unwrap_err();

    assert_eq!(err.kinds(), vec![ErrorKind::InvalidState]);
    assert!(
        source
            .requests()
            .iter()
            .all(|request| request.param("campaign_id") == Some("42"))
    );
    assert!(destination.writes().await.is_empty());
}
