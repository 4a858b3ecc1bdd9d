use config::shared::RetryConfig;
use tracing::{debug, info, warn};

use crate::bail;
use crate::concurrency::shutdown::{ShutdownRx, is_shutdown_requested};
use crate::error::{ErrorKind, EtlResult};
use crate::pagination::probe::{ProbePage, inspect_probe};
use crate::source::PageSource;
use crate::types::ExtractionSession;

/// Determines how many pages a session has to fetch.
///
/// The first page is probed with every filter of the session. A page count reported by the
/// server is used as is. Otherwise, if the first page holds items, the last non-empty page is
/// found by binary search between the session's page bounds.
#[derive(Debug)]
pub struct PageCountResolver<'a, S> {
    source: &'a S,
    retry: &'a RetryConfig,
    shutdown_rx: Option<ShutdownRx>,
}

impl<'a, S> PageCountResolver<'a, S>
where
    S: PageSource,
{
    pub fn new(source: &'a S, retry: &'a RetryConfig) -> Self {
        Self {
            source,
            retry,
            shutdown_rx: None,
        }
    }

    /// Stops probing once a shutdown is requested on `shutdown_rx`.
    pub fn with_shutdown(mut self, shutdown_rx: ShutdownRx) -> Self {
        self.shutdown_rx = Some(shutdown_rx);
        self
    }

    /// Resolves the page count, stores it in the session and returns it.
    pub async fn resolve(&self, session: &mut ExtractionSession) -> EtlResult<u32> {
        let page_count = self.page_count(session).await?;
        session.page_count = Some(page_count);

        info!(
            endpoint = %session.endpoint.name,
            parent_id = session.parent_id().unwrap_or("-"),
            page_count,
            "resolved page count"
        );

        Ok(page_count)
    }

    async fn page_count(&self, session: &ExtractionSession) -> EtlResult<u32> {
        if !session.endpoint.paginated {
            return Ok(1);
        }

        let first = self.probe(session, 1).await?;
        if let Some(page_count) = first.page_count {
            return Ok(page_count);
        }

        if !first.has_items {
            return Ok(0);
        }

        self.search(session).await
    }

    /// Binary search over `[min_pages, max_pages]`.
    ///
    /// `low` always points at a page known to hold items and `high` at a page assumed empty.
    /// Pagination is assumed monotonic.
    async fn search(&self, session: &ExtractionSession) -> EtlResult<u32> {
        let mut low = session.min_pages.max(1);
        let mut high = session.max_pages.max(low);

        while high - low > 1 {
            let mid = low + (high - low) / 2;
            debug!(endpoint = %session.endpoint.name, low, high, mid, "probing page");

            if self.probe(session, mid).await?.has_items {
                low = mid;
            } else {
                high = mid;
            }
        }

        Ok(low)
    }

    async fn probe(&self, session: &ExtractionSession, page: u32) -> EtlResult<ProbePage> {
        if let Some(shutdown_rx) = &self.shutdown_rx
            && is_shutdown_requested(shutdown_rx)
        {
            bail!(
                ErrorKind::InvalidState,
                "Page count resolution stopped",
                format!("{} before probing page {page}", session.endpoint.name)
            );
        }

        let request = session.page_request(page);
        let max_attempts = self.retry.max_attempts.max(1);

        let mut attempt = 1;
        let text = loop {
            match self.source.fetch_page(&request).await {
                Ok(text) => break text,
                Err(err) if err.kind().is_transient() && attempt < max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        endpoint = %request.endpoint,
                        page,
                        attempt,
                        error = %err,
                        "probe request failed, retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        };

        inspect_probe(&text, &session.endpoint)
    }
}
