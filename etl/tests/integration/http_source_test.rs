use config::shared::{ApiConfig, ExtractionConfig, PageRetryConfig, RetryConfig};
use etl::destination::LoadMode;
use etl::destination::memory::MemoryDestination;
use etl::error::ErrorKind;
use etl::pipeline::{Pipeline, PipelineConfig};
use etl::source::http::HttpPageSource;
use etl::source::{PageRequest, PageSource};
use etl::test_utils::fixtures::{item_xml, messages_endpoint, page_xml};
use etl::types::{MissingKeyPolicy, TableName};
use secrecy::SecretString;
use telemetry::init_test_tracing;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// `user:secret` in base64.
const BASIC_AUTH: &str = "Basic dXNlcjpzZWNyZXQ=";

fn api_config(server: &MockServer) -> ApiConfig {
    ApiConfig {
        base_url: format!("{}/api", server.uri()),
        username: "user".to_string(),
        password: SecretString::new("secret".to_string()),
        request_timeout_secs: 5,
        probe_retry: RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 1,
            backoff_multiplier: 1.0,
        },
    }
}

fn message_page(ids: &[u32], page_count: u32) -> String {
    let items: Vec<String> = ids
        .iter()
        .map(|id| {
            item_xml(
                "message",
                &[
                    ("id", id.to_string()),
                    ("body", format!("message {id}")),
                    ("received_at", "2024-02-01 12:00:00 UTC".to_string()),
                ],
            )
        })
        .collect();

    page_xml("messages", &items, Some(page_count))
}

#[tokio::test]
async fn page_is_requested_with_auth_and_query() {
    init_test_tracing();
    let server = MockServer::start().await;
    let body = message_page(&[1, 2], 1);

    Mock::given(method("GET"))
        .and(path("/api/messages"))
        .and(query_param("page", "3"))
        .and(query_param("limit", "500"))
        .and(query_param("campaign_id", "42"))
        .and(header("authorization", BASIC_AUTH))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let source = HttpPageSource::new(&api_config(&server)).unwrap();
    let request = PageRequest::new("messages", 3)
        .with_param("limit", "500")
        .with_param("campaign_id", "42");

    let text = source.fetch_page(&request).await.unwrap();

    assert_eq!(text, body);
}

#[tokio::test]
async fn error_statuses_are_classified() {
    init_test_tracing();
    let server = MockServer::start().await;

    for (page, status) in [(1u32, 503u16), (2, 429), (3, 404), (4, 500)] {
        Mock::given(method("GET"))
            .and(path("/api/messages"))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
    }

    let source = HttpPageSource::new(&api_config(&server)).unwrap();
    let expected = [
        (1, ErrorKind::SourceServerError),
        (2, ErrorKind::SourceRateLimited),
        (3, ErrorKind::SourceClientError),
        (4, ErrorKind::SourceServerError),
    ];

    for (page, kind) in expected {
        let err = source
            .fetch_page(&PageRequest::new("messages", page))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), kind, "page {page}");
        assert_eq!(err.kind().is_transient(), kind != ErrorKind::SourceClientError);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_extracts_endpoint_over_http() {
    init_test_tracing();
    let server = MockServer::start().await;

    // Page 1 answers the probe and the fetch, so it is served twice.
    Mock::given(method("GET"))
        .and(path("/api/messages"))
        .and(query_param("page", "1"))
        .and(header("authorization", BASIC_AUTH))
        .respond_with(ResponseTemplate::new(200).set_body_string(message_page(&[1, 2], 2)))
        .expect(2)
        .mount(&server)
        .await;

    // The first attempt of page 2 fails and is retried.
    Mock::given(method("GET"))
        .and(path("/api/messages"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/messages"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(message_page(&[3], 2)))
        .expect(1)
        .mount(&server)
        .await;

    let config = api_config(&server);
    let source = HttpPageSource::new(&config).unwrap();
    let destination = MemoryDestination::new();
    let pipeline = Pipeline::new(
        PipelineConfig {
            extraction: ExtractionConfig {
                page_retry: PageRetryConfig {
                    max_attempts: 3,
                    delay_ms: 1,
                },
                ..ExtractionConfig::default()
            },
            probe_retry: config.probe_retry.clone(),
            schema: "mobile_commons".to_string(),
            table_prefix: "mc".to_string(),
            missing_key_policy: MissingKeyPolicy::ForceFullRebuild,
        },
        source,
        destination.clone(),
    );

    let summary = pipeline.run(messages_endpoint(), true).await.unwrap();

    assert_eq!(summary.pages, 2);
    assert_eq!(summary.rows_loaded, 3);
    assert_eq!(summary.report.fetched, 2);
    assert_eq!(summary.report.failed, 0);

    let table = TableName::for_endpoint("mobile_commons", "mc", "messages");
    assert_eq!(
        destination.writes().await,
        vec![(table.clone(), LoadMode::Replace, 3)]
    );

    let ids: Vec<i64> = destination
        .table_rows(&table)
        .await
        .iter()
        .filter_map(|row| row.values()[0].as_i64())
        .collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![1, 2, 3]);
}
