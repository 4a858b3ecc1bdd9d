use config::shared::ExtractorConfig;
use etl::catalog::EndpointCatalog;
use etl::destination::Destination;
use etl::destination::memory::MemoryDestination;
use etl::destination::postgres::PostgresDestination;
use etl::pipeline::{Pipeline, PipelineConfig};
use etl::source::PageSource;
use etl::source::http::HttpPageSource;
use etl::types::MissingKeyPolicy;
use tracing::{error, info, warn};

use crate::drivers::{Job, JobPlan, run_plan};

// Builds the pipeline for a concrete destination type and runs the plan on it.
macro_rules! run_pipeline_dispatch {
    ($config:expr, $source:expr, $destination:expr, $catalog:expr, $plan:expr, $options:expr, $excluded:expr) => {{
        let pipeline = Pipeline::new($config, $source, $destination);
        run_pipeline(pipeline, $catalog, $plan, $options, $excluded).await
    }};
}

/// Flags of a single run that are not part of the configuration files.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub full_rebuild: bool,
    pub dry_run: bool,
}

pub async fn start_extractor(
    extractor_config: ExtractorConfig,
    job: Job,
    options: RunOptions,
) -> anyhow::Result<()> {
    let catalog = EndpointCatalog::from_file(&extractor_config.catalog_path)?;
    let plan = job.plan();

    info!(
        ?plan,
        full_rebuild = options.full_rebuild,
        dry_run = options.dry_run,
        endpoints = catalog.len(),
        "starting extractor"
    );

    // Per-session settings come from the extraction section, table naming from the destination.
    let pipeline_config = PipelineConfig {
        extraction: extractor_config.extraction.clone(),
        probe_retry: extractor_config.api.probe_retry.clone(),
        schema: extractor_config.destination.schema.clone(),
        table_prefix: extractor_config.destination.table_prefix.clone(),
        missing_key_policy: MissingKeyPolicy::ForceFullRebuild,
    };

    let source = HttpPageSource::new(&extractor_config.api)?;
    let excluded = &extractor_config.excluded_parent_ids;

    // Dry runs never touch the destination database, watermarks are therefore always absent.
    if options.dry_run {
        let destination = MemoryDestination::new();

        run_pipeline_dispatch!(
            pipeline_config,
            source,
            destination,
            &catalog,
            &plan,
            options,
            excluded
        )?;
    } else {
        let destination = PostgresDestination::connect(
            &extractor_config.destination,
            &extractor_config.extraction.load_batch,
        )
        .await?;

        run_pipeline_dispatch!(
            pipeline_config,
            source,
            destination,
            &catalog,
            &plan,
            options,
            excluded
        )?;
    }

    Ok(())
}

async fn run_pipeline<S, D>(
    pipeline: Pipeline<S, D>,
    catalog: &EndpointCatalog,
    plan: &JobPlan,
    options: RunOptions,
    excluded_parent_ids: &[String],
) -> anyhow::Result<()>
where
    S: PageSource + Clone + Sync,
    D: Destination + Sync,
{
    // Ctrl+C stops the run before its next session, probe or chunk.
    let shutdown_tx = pipeline.shutdown_tx();
    let shutdown_handle = tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {:?}", e);
            return;
        }

        info!("Ctrl+C received, stopping extraction...");
        if let Err(e) = shutdown_tx.shutdown() {
            warn!("Failed to send shutdown signal: {:?}", e);
        }
    });

    let result = run_plan(
        &pipeline,
        catalog,
        plan,
        options.full_rebuild,
        excluded_parent_ids,
    )
    .await;

    // The run is over either way, the listener is no longer needed.
    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    let summary = result?;
    if summary.report.failed > 0 {
        warn!(
            endpoint = %summary.endpoint,
            failed_pages = ?summary.report.failed_pages,
            "some pages could not be fetched and were skipped"
        );
    }

    info!(
        endpoint = %summary.endpoint,
        pages = summary.pages,
        rows_loaded = summary.rows_loaded,
        "extractor finished"
    );

    Ok(())
}
