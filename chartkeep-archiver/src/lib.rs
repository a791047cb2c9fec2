//! chartkeep-archiver: weekly chart archival and all-time ranking
//!
//! One cycle computes the chart dates missing from the archive, fetches and
//! archives them with bounded concurrency, then folds every archived snapshot
//! into a deterministic all-time ranking.

pub mod config;
pub mod error;
pub mod fetch;
pub mod parser;
pub mod ranking;
pub mod report;
pub mod scheduler;
pub mod store;

use crate::config::ArchiverConfig;
use crate::error::Result;
use crate::fetch::{ChartSource, FetchCoordinator, FetchReport, HttpChartSource};
use crate::ranking::RankedEntry;
use crate::report::CoveredRange;
use crate::store::{ArchiveStore, FileArchive, SqliteArchive};
use chartkeep_common::config::{RootFolderInitializer, StorageBackend};
use chrono::NaiveDate;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Outcome of one archival and ranking cycle
#[derive(Debug)]
pub struct CycleReport {
    /// Dates the scheduler found missing
    pub targets: Vec<NaiveDate>,
    /// `None` when fetching was disabled or nothing was missing
    pub fetch: Option<FetchReport>,
    /// `None` when the cycle was cancelled before ranking
    pub ranking: Option<Vec<RankedEntry>>,
    /// Archived date range the ranking covers
    pub range: Option<CoveredRange>,
}

impl CycleReport {
    pub fn failed_dates(&self) -> usize {
        self.fetch.as_ref().map_or(0, |f| f.failed.len())
    }

    pub fn cancelled_dates(&self) -> usize {
        self.fetch.as_ref().map_or(0, |f| f.cancelled.len())
    }

    /// Every targeted date was archived or found empty, and ranking ran
    pub fn is_complete(&self) -> bool {
        self.failed_dates() == 0 && self.cancelled_dates() == 0 && self.ranking.is_some()
    }
}

/// Open the configured archive backend under the root folder
pub async fn open_store(
    config: &ArchiverConfig,
    initializer: &RootFolderInitializer,
) -> Result<Arc<dyn ArchiveStore>> {
    let store: Arc<dyn ArchiveStore> = match config.backend {
        StorageBackend::File => Arc::new(FileArchive::open(initializer.archive_dir())?),
        StorageBackend::Sqlite => Arc::new(SqliteArchive::open(&initializer.database_path()).await?),
    };
    Ok(store)
}

/// HTTP chart source built from the configured endpoint and limits
pub fn http_source(config: &ArchiverConfig) -> Result<Arc<dyn ChartSource>> {
    let source = HttpChartSource::new(
        config.base_url.clone(),
        config.request_timeout,
        config.request_spacing,
    )?;
    Ok(Arc::new(source))
}

/// Run one cycle: schedule, fetch, aggregate
///
/// Per-date fetch failures are reported, never returned as errors. Archive
/// enumeration and aggregation failures abort the cycle.
pub async fn run_cycle(
    config: &ArchiverConfig,
    store: Arc<dyn ArchiveStore>,
    source: Arc<dyn ChartSource>,
    today: NaiveDate,
    cancel: &CancellationToken,
) -> Result<CycleReport> {
    let archived = store.list_dates().await?;
    let targets = scheduler::missing_dates(
        &config.cadence,
        config.start_date,
        today,
        &archived,
        config.resume_policy,
    );

    info!(
        backend = store.backend(),
        archived = archived.len(),
        missing = targets.len(),
        policy = %config.resume_policy,
        "Archive scanned"
    );

    let fetch = if !config.fetch {
        info!("Fetching disabled, ranking existing archive only");
        None
    } else if targets.is_empty() {
        None
    } else {
        let coordinator = FetchCoordinator::new(source, store.clone(), config.request_timeout);
        Some(
            coordinator
                .run(targets.clone(), config.concurrency, cancel)
                .await,
        )
    };

    if cancel.is_cancelled() {
        info!("Cycle cancelled, skipping ranking");
        return Ok(CycleReport {
            targets,
            fetch,
            ranking: None,
            range: None,
        });
    }

    let snapshots = store.snapshots().await?;
    let range = CoveredRange::of(snapshots.iter().map(|s| s.date));
    let ranking = ranking::aggregate(&snapshots, config.chart_size, config.rank_policy)?;

    info!(
        snapshots = snapshots.len(),
        songs = ranking.len(),
        policy = %config.rank_policy,
        "Ranking computed"
    );

    Ok(CycleReport {
        targets,
        fetch,
        ranking: Some(ranking),
        range,
    })
}
