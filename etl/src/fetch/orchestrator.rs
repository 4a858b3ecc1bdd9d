use config::shared::PageRetryConfig;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tracing::{debug, info, warn};

use crate::bail;
use crate::concurrency::gate::ConnectionGate;
use crate::concurrency::shutdown::{ShutdownRx, is_shutdown_requested};
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::fetch::chunks::chunk_pages;
use crate::normalize::{Normalized, SkipReason, normalize_page};
use crate::source::PageSource;
use crate::types::{ExtractionSession, RecordBatch};

/// Outcome of fetching a single page.
#[derive(Debug)]
pub enum PageOutcome {
    /// The page was fetched and normalized into rows.
    Fetched { page: u32, batch: RecordBatch },
    /// The page was fetched but contributed no rows.
    Skipped { page: u32, reason: SkipReason },
    /// Every attempt failed, or the failure was not worth retrying.
    Failed {
        page: u32,
        attempts: u32,
        error: EtlError,
    },
}

impl PageOutcome {
    pub fn page(&self) -> u32 {
        match self {
            PageOutcome::Fetched { page, .. }
            | PageOutcome::Skipped { page, .. }
            | PageOutcome::Failed { page, .. } => *page,
        }
    }
}

/// Per-page counters of one [`FetchOrchestrator::fetch_all`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub requested: u32,
    pub fetched: u32,
    pub skipped: u32,
    pub failed: u32,
    pub rows: u64,
    /// Pages that were dropped after failing, in ascending order. Merged reports of several
    /// parents may list a page number once per parent.
    pub failed_pages: Vec<u32>,
}

impl FetchReport {
    fn record(&mut self, outcome: &PageOutcome) {
        self.requested += 1;

        match outcome {
            PageOutcome::Fetched { batch, .. } => {
                self.fetched += 1;
                self.rows += batch.len() as u64;
            }
            PageOutcome::Skipped { .. } => self.skipped += 1,
            PageOutcome::Failed { page, .. } => {
                self.failed += 1;
                let index = self.failed_pages.partition_point(|failed| failed < page);
                self.failed_pages.insert(index, *page);
            }
        }
    }

    /// Merges the counters of another fetch, e.g. of another parent of the same endpoint.
    pub fn merge(&mut self, other: &FetchReport) {
        self.requested += other.requested;
        self.fetched += other.fetched;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.rows += other.rows;
        self.failed_pages.extend_from_slice(&other.failed_pages);
        self.failed_pages.sort_unstable();
    }
}

/// Rows of a session together with how they were obtained.
#[derive(Debug, Clone, Default)]
pub struct FetchOutput {
    pub batch: RecordBatch,
    pub report: FetchReport,
}

/// Fetches every page of a session concurrently, bounded by a [`ConnectionGate`].
///
/// Pages are grouped into chunks with [`chunk_pages`]. Chunks run one after another and the
/// pages of a chunk run concurrently. A gate permit is only held for the duration of the HTTP
/// call, so retry sleeps and payload parsing never block other requests.
#[derive(Debug, Clone)]
pub struct FetchOrchestrator<S> {
    source: S,
    gate: ConnectionGate,
    chunk_threshold: u32,
    retry: PageRetryConfig,
    shutdown_rx: Option<ShutdownRx>,
}

impl<S> FetchOrchestrator<S>
where
    S: PageSource + Sync,
{
    pub fn new(
        source: S,
        gate: ConnectionGate,
        chunk_threshold: u32,
        retry: PageRetryConfig,
    ) -> Self {
        Self {
            source,
            gate,
            chunk_threshold,
            retry,
            shutdown_rx: None,
        }
    }

    /// Stops scheduling new chunks once a shutdown is requested on `shutdown_rx`.
    pub fn with_shutdown(mut self, shutdown_rx: ShutdownRx) -> Self {
        self.shutdown_rx = Some(shutdown_rx);
        self
    }

    /// Fetches pages `1..=page_count` of a session whose page count was resolved.
    ///
    /// Rows are filtered to the declared columns of the endpoint. When the session is scoped
    /// to a parent and the endpoint declares the parent column, every row is stamped with the
    /// parent id. Pages that fail are dropped and counted in the report.
    pub async fn fetch_all(&self, session: &ExtractionSession) -> EtlResult<FetchOutput> {
        let Some(page_count) = session.page_count else {
            bail!(
                ErrorKind::InvalidState,
                "Page count must be resolved before fetching",
                session.endpoint.name
            );
        };

        let chunks = chunk_pages(page_count, self.chunk_threshold);
        let chunk_count = chunks.len();

        let mut output = FetchOutput::default();
        for (index, chunk) in chunks.into_iter().enumerate() {
            if let Some(shutdown_rx) = &self.shutdown_rx
                && is_shutdown_requested(shutdown_rx)
            {
                bail!(
                    ErrorKind::InvalidState,
                    "Extraction stopped before every chunk was fetched",
                    format!("{} of {chunk_count} chunks fetched", index)
                );
            }

            debug!(
                endpoint = %session.endpoint.name,
                chunk = index + 1,
                chunk_count,
                start = chunk.start,
                end = chunk.end - 1,
                "fetching chunk"
            );

            let mut pending: FuturesUnordered<_> = chunk
                .map(|page| self.fetch_page(session, page))
                .collect();

            while let Some(outcome) = pending.next().await {
                output.report.record(&outcome);
                if let PageOutcome::Fetched { batch, .. } = outcome {
                    output.batch.concat(batch);
                }
            }
        }

        output
            .batch
            .retain_columns(&session.endpoint.column_names());

        if let Some(parent) = &session.parent
            && session.endpoint.has_column(parent.param.as_str())
        {
            output.batch.stamp(parent.param.as_str(), &parent.id);
        }

        info!(
            endpoint = %session.endpoint.name,
            parent_id = session.parent_id().unwrap_or("-"),
            pages = output.report.requested,
            fetched = output.report.fetched,
            skipped = output.report.skipped,
            failed = output.report.failed,
            rows = output.batch.len(),
            "fetched pages"
        );

        Ok(output)
    }

    async fn fetch_page(&self, session: &ExtractionSession, page: u32) -> PageOutcome {
        let request = session.page_request(page);
        let max_attempts = self.retry.max_attempts.max(1);

        let mut attempt = 1;
        loop {
            let result = match self.gate.acquire().await {
                Ok(_permit) => self.source.fetch_page(&request).await,
                Err(err) => Err(err),
            };

            match result {
                Ok(text) => {
                    return match normalize_page(&text, &session.endpoint) {
                        Normalized::Batch(batch) => PageOutcome::Fetched { page, batch },
                        Normalized::Skipped(reason) => {
                            debug!(endpoint = %request.endpoint, page, %reason, "page skipped");
                            PageOutcome::Skipped { page, reason }
                        }
                    };
                }
                Err(err) if err.kind().is_transient() && attempt < max_attempts => {
                    warn!(
                        endpoint = %request.endpoint,
                        page,
                        attempt,
                        error = %err,
                        "page request failed, retrying"
                    );
                    tokio::time::sleep(self.retry.delay()).await;
                    attempt += 1;
                }
                Err(error) => {
                    warn!(
                        endpoint = %request.endpoint,
                        page,
                        attempts = attempt,
                        error = %error,
                        "dropping page"
                    );
                    return PageOutcome::Failed {
                        page,
                        attempts: attempt,
                        error,
                    };
                }
            }
        }
    }
}
