//! Tracing setup for the extractor binary and the test suites.

use std::sync::Once;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "info";

/// Tests only emit logs when this variable is set, to keep `cargo test` output readable.
const ENABLE_TEST_TRACING_ENV_NAME: &str = "ENABLE_TRACING";

static INIT_TEST_TRACING: Once = Once::new();

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to install the log bridge: {0}")]
    LogBridge(#[from] tracing_log::log::SetLoggerError),

    #[error("failed to install the tracing subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Installs the global subscriber writing formatted events to stdout.
///
/// Events from crates using `log` are bridged into tracing. The returned guard flushes the
/// non-blocking writer on drop, so it must be kept alive for the whole process.
pub fn init_tracing(app_name: &str) -> Result<WorkerGuard, TracingError> {
    LogTracer::init()?;

    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(writer))
        .try_init()?;

    tracing::info!(app = app_name, "tracing initialized");

    Ok(guard)
}

/// Installs a test subscriber once per process when `ENABLE_TRACING` is set.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var(ENABLE_TEST_TRACING_ENV_NAME).is_err() {
            return;
        }

        let _ = tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt::layer().with_test_writer())
            .try_init();
    });
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}
