//! Extractor binary.
//!
//! Pulls one job worth of endpoints from the XML REST API and loads them into Postgres. The
//! job is picked on the command line, everything else comes from the `configuration` directory
//! and `APP_`-prefixed environment variables.

use clap::Parser;
use telemetry::init_tracing;

use crate::config::load_extractor_config;
use crate::core::{RunOptions, start_extractor};
use crate::drivers::Job;

mod config;
mod core;
mod drivers;

#[derive(Debug, Parser)]
#[command(name = "extractor", about = "Extracts paginated API endpoints into Postgres")]
struct Cli {
    /// Rebuild the tables instead of appending rows newer than the stored watermark.
    #[arg(long, global = true)]
    full_rebuild: bool,

    /// Extract into memory and skip every write to the destination.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    job: Job,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let extractor_config = load_extractor_config()?;

    // The guard flushes buffered log lines when dropped, keep it until the end of main.
    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"))?;

    let options = RunOptions {
        full_rebuild: cli.full_rebuild || extractor_config.full_rebuild,
        dry_run: cli.dry_run,
    };

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_extractor(extractor_config, cli.job, options))?;

    Ok(())
}
