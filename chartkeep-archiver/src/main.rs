//! chartkeep - weekly chart archiver and all-time ranking
//!
//! Runs one cycle: archive every missing weekly chart, then rank all archived
//! songs and write `export.json` and `README.md` into the root folder.
//!
//! Exit status: 0 on success, 2 when some dates failed or were cancelled,
//! 1 on a fatal error.

use anyhow::{Context, Result};
use chartkeep_archiver::config::{ArchiverConfig, CliOverrides};
use chartkeep_archiver::ranking::RankPolicy;
use chartkeep_archiver::report;
use chartkeep_archiver::scheduler::ResumePolicy;
use chartkeep_common::config::{load_toml_config, RootFolderInitializer, StorageBackend};
use chartkeep_common::time::{self, parse_date};
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Command-line arguments for chartkeep
#[derive(Parser, Debug)]
#[command(name = "chartkeep")]
#[command(about = "Archive weekly charts and rank every song they contain")]
#[command(version)]
struct Args {
    /// Root folder holding the archive and reports
    #[arg(long)]
    root_folder: Option<PathBuf>,

    /// First chart date to archive (YYYY-MM-DD)
    #[arg(long, value_parser = parse_start_date)]
    start_date: Option<NaiveDate>,

    /// Maximum number of concurrent fetches
    #[arg(long)]
    concurrency: Option<usize>,

    /// Archive backend: file or sqlite
    #[arg(long)]
    backend: Option<StorageBackend>,

    /// Resume policy: full-gap or high-watermark
    #[arg(long)]
    policy: Option<ResumePolicy>,

    /// Rank numbering: competition or dense
    #[arg(long)]
    rank: Option<RankPolicy>,

    /// Only re-rank the existing archive
    #[arg(long)]
    no_fetch: bool,
}

fn parse_start_date(text: &str) -> std::result::Result<NaiveDate, String> {
    parse_date(text).map_err(|e| e.to_string())
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            root_folder: self.root_folder.clone(),
            start_date: self.start_date,
            concurrency: self.concurrency,
            backend: self.backend,
            resume_policy: self.policy,
            rank_policy: self.rank,
            no_fetch: self.no_fetch,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let toml_config = load_toml_config();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&toml_config.logging.level)),
        )
        .init();

    info!(
        "Starting chartkeep v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let config = match ArchiverConfig::resolve(&args.overrides(), &toml_config) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(1);
        }
    };

    match run(config).await {
        Ok(code) => code,
        Err(e) => {
            error!("chartkeep failed: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(config: ArchiverConfig) -> Result<ExitCode> {
    let initializer = RootFolderInitializer::new(config.root_folder.clone());
    initializer
        .ensure_directory_exists()
        .with_context(|| format!("creating {}", config.root_folder.display()))?;
    info!("Root folder: {}", initializer.root_folder().display());

    let store = chartkeep_archiver::open_store(&config, &initializer).await?;
    let source = chartkeep_archiver::http_source(&config)?;

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight writes");
            ctrl_c_token.cancel();
        }
    });

    let cycle =
        chartkeep_archiver::run_cycle(&config, store, source, time::today(), &cancel).await?;

    if let Some(ranking) = &cycle.ranking {
        report::write_report(initializer.root_folder(), ranking, cycle.range)
            .context("writing ranking report")?;
    }

    if cycle.is_complete() {
        info!("Cycle complete");
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(fetch) = &cycle.fetch {
        for (date, err) in &fetch.failed {
            warn!(%date, error = %err, "Not archived");
        }
    }
    warn!(
        failed = cycle.failed_dates(),
        cancelled = cycle.cancelled_dates(),
        "Cycle incomplete; missing dates will be retried on the next run"
    );
    Ok(ExitCode::from(2))
}
