use std::sync::Arc;

use config::shared::{ExtractionConfig, RetryConfig};
use tracing::{error, info};

use crate::bail;
use crate::concurrency::gate::ConnectionGate;
use crate::concurrency::shutdown::{
    ShutdownRx, ShutdownTx, create_shutdown_channel, is_shutdown_requested,
};
use crate::destination::{Destination, LoadMode};
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::fetch::{FetchOrchestrator, FetchOutput, FetchReport};
use crate::load::{LoadSummary, Loader};
use crate::pagination::PageCountResolver;
use crate::source::PageSource;
use crate::types::{
    EndpointDescriptor, ExtractionMode, ExtractionSession, MissingKeyPolicy, ParentFilter,
    ParentParam, RecordBatch, TableName,
};
use crate::watermark::WatermarkTracker;

/// Settings shared by every session a [`Pipeline`] runs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub extraction: ExtractionConfig,
    /// Retry policy of page count probes.
    pub probe_retry: RetryConfig,
    /// Destination schema of every endpoint table.
    pub schema: String,
    /// Prefix of every endpoint table name, omitted when empty.
    pub table_prefix: String,
    pub missing_key_policy: MissingKeyPolicy,
}

/// Outcome of extracting and loading one endpoint.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub endpoint: String,
    /// Number of sessions, one per parent id or a single one without parents.
    pub sessions: usize,
    /// Sum of the resolved page counts of every session.
    pub pages: u64,
    pub rows_loaded: u64,
    pub report: FetchReport,
    /// `None` when there was nothing to load.
    pub load: Option<LoadSummary>,
}

/// Extracts endpoints from a [`PageSource`] and loads them into a [`Destination`].
///
/// Each session resolves its watermark, then its page count, then fetches every page and
/// finally hands the rows to the loader. All sessions of a pipeline share one
/// [`ConnectionGate`], so the request ceiling holds across parents.
///
/// A shutdown requested through [`Pipeline::shutdown_tx`] stops the pipeline before the next
/// session, probe or chunk starts.
#[derive(Debug)]
pub struct Pipeline<S, D> {
    config: Arc<PipelineConfig>,
    source: S,
    destination: D,
    gate: ConnectionGate,
    shutdown_tx: ShutdownTx,
    shutdown_rx: ShutdownRx,
}

impl<S, D> Pipeline<S, D>
where
    S: PageSource + Clone + Sync,
    D: Destination + Sync,
{
    pub fn new(config: PipelineConfig, source: S, destination: D) -> Self {
        let gate = ConnectionGate::new(config.extraction.max_concurrent_requests);

        Self::with_gate(config, source, destination, gate)
    }

    /// Creates a pipeline drawing request permits from an existing gate.
    pub fn with_gate(
        config: PipelineConfig,
        source: S,
        destination: D,
        gate: ConnectionGate,
    ) -> Self {
        // The pipeline keeps a receiver so a shutdown requested between fetches is not lost.
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

        Self {
            config: Arc::new(config),
            source,
            destination,
            gate,
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    /// Destination table of `endpoint`.
    pub fn table_name(&self, endpoint: &EndpointDescriptor) -> TableName {
        TableName::for_endpoint(&self.config.schema, &self.config.table_prefix, &endpoint.name)
    }

    /// Creates a session of `endpoint` with the pipeline defaults.
    pub fn session(
        &self,
        endpoint: Arc<EndpointDescriptor>,
        full_rebuild: bool,
    ) -> ExtractionSession {
        ExtractionSession::new(
            endpoint,
            ExtractionMode::from_full_rebuild(full_rebuild),
            &self.config.extraction,
        )
        .with_missing_key_policy(self.config.missing_key_policy)
    }

    /// Resolves the watermark and page count of `session`, then fetches all of its pages.
    ///
    /// A session without pages fetches nothing and returns an empty output. Fails with
    /// [`ErrorKind::InvalidState`] once a shutdown was requested.
    pub async fn extract(&self, session: &mut ExtractionSession) -> EtlResult<FetchOutput> {
        self.ensure_running(session)?;

        let table = self.table_name(&session.endpoint);

        WatermarkTracker::new(&self.destination)
            .resolve(&table, session)
            .await?;

        let page_count = PageCountResolver::new(&self.source, &self.config.probe_retry)
            .with_shutdown(self.shutdown_rx.clone())
            .resolve(session)
            .await?;

        if page_count == 0 {
            info!(
                endpoint = %session.endpoint.name,
                parent_id = session.parent_id().unwrap_or("-"),
                "no pages to fetch"
            );

            return Ok(FetchOutput::default());
        }

        let orchestrator = FetchOrchestrator::new(
            self.source.clone(),
            self.gate.clone(),
            self.config.extraction.chunk_threshold,
            self.config.extraction.page_retry.clone(),
        )
        .with_shutdown(self.shutdown_rx.clone());

        orchestrator.fetch_all(session).await
    }

    /// Loads `batch` into the table of `endpoint`. An empty batch is not loaded.
    pub async fn load(
        &self,
        endpoint: &EndpointDescriptor,
        mode: LoadMode,
        batch: RecordBatch,
    ) -> EtlResult<Option<LoadSummary>> {
        let table = self.table_name(endpoint);

        if batch.is_empty() {
            info!(endpoint = %endpoint.name, %table, "no rows to load");
            return Ok(None);
        }

        let summary = Loader::new(&self.destination)
            .load(&table, endpoint, mode, batch)
            .await?;

        Ok(Some(summary))
    }

    /// Extracts and loads one endpoint without a parent filter.
    pub async fn run(
        &self,
        endpoint: Arc<EndpointDescriptor>,
        full_rebuild: bool,
    ) -> EtlResult<RunSummary> {
        info!(endpoint = %endpoint.name, full_rebuild, "starting extraction");

        let mut session = self.session(endpoint.clone(), full_rebuild);
        let output = self.extract(&mut session).await?;
        let pages = u64::from(session.page_count.unwrap_or_default());

        let load = self
            .load(&endpoint, session.load_mode(), output.batch)
            .await?;

        Ok(summarize(&endpoint, 1, pages, output.report, load))
    }

    /// Extracts `endpoint` once per parent id and loads the rows of every parent at once.
    ///
    /// Parent sessions run one after another against the shared gate. When any parent fails,
    /// nothing is loaded and the errors of every failed parent are returned together. A
    /// shutdown stops the loop at the parent it interrupted.
    pub async fn run_for_parents(
        &self,
        endpoint: Arc<EndpointDescriptor>,
        full_rebuild: bool,
        param: ParentParam,
        parent_ids: &[String],
    ) -> EtlResult<RunSummary> {
        info!(
            endpoint = %endpoint.name,
            full_rebuild,
            %param,
            parents = parent_ids.len(),
            "starting extraction for parents"
        );

        let mut batch = RecordBatch::new();
        let mut report = FetchReport::default();
        let mut pages = 0u64;
        let mut load_mode = None;
        let mut errors: Vec<EtlError> = Vec::new();

        for parent_id in parent_ids {
            let mut session = self
                .session(endpoint.clone(), full_rebuild)
                .with_parent(ParentFilter::new(param, parent_id.clone()));

            match self.extract(&mut session).await {
                Ok(output) => {
                    pages += u64::from(session.page_count.unwrap_or_default());
                    report.merge(&output.report);
                    batch.concat(output.batch);
                    load_mode.get_or_insert(session.load_mode());
                }
                Err(err) => {
                    error!(
                        endpoint = %endpoint.name,
                        parent_id = %parent_id,
                        error = %err,
                        "extraction failed for parent"
                    );

                    let stopped = err.kind() == ErrorKind::InvalidState;
                    errors.push(err);
                    if stopped {
                        break;
                    }
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors.into());
        }

        let load = match load_mode {
            Some(mode) => self.load(&endpoint, mode, batch).await?,
            None => None,
        };

        Ok(summarize(&endpoint, parent_ids.len(), pages, report, load))
    }

    fn ensure_running(&self, session: &ExtractionSession) -> EtlResult<()> {
        if is_shutdown_requested(&self.shutdown_rx) {
            bail!(
                ErrorKind::InvalidState,
                "Extraction stopped before the session started",
                format!(
                    "endpoint {}, parent {}",
                    session.endpoint.name,
                    session.parent_id().unwrap_or("-")
                )
            );
        }

        Ok(())
    }
}

fn summarize(
    endpoint: &EndpointDescriptor,
    sessions: usize,
    pages: u64,
    report: FetchReport,
    load: Option<LoadSummary>,
) -> RunSummary {
    let summary = RunSummary {
        endpoint: endpoint.name.clone(),
        sessions,
        pages,
        rows_loaded: load.as_ref().map(|load| load.rows).unwrap_or_default(),
        report,
        load,
    };

    info!(
        endpoint = %summary.endpoint,
        sessions = summary.sessions,
        pages = summary.pages,
        failed_pages = summary.report.failed,
        rows_loaded = summary.rows_loaded,
        "finished extraction"
    );

    summary
}
