//! Bounded-concurrency fetch pipeline
//!
//! One task per missing chart date: fetch the page, parse it, and archive the
//! snapshot. At most `limit` tasks are in flight at once
//! (`futures::stream::buffer_unordered`). A failure in one task is recorded
//! against its date and never stops the others.
//!
//! Cancellation is checked before each task starts and raced against both
//! the wait for the source's request slot and the network request. Once a
//! page has been received the task runs to completion, so an interrupted run
//! never leaves a partial snapshot behind.

use super::client::{ChartSource, TransportError};
use crate::parser::{self, ParseError};
use crate::store::{ArchiveStore, StoreError};
use chartkeep_common::ChartSnapshot;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why a single date could not be archived
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Page did not parse: {0}")]
    Parse(#[from] ParseError),

    #[error("Parsed chart is inconsistent: {0}")]
    Malformed(chartkeep_common::Error),

    #[error("Archive error: {0}")]
    Store(#[from] StoreError),
}

/// Result of one per-date task
#[derive(Debug)]
pub enum FetchOutcome {
    /// Snapshot written with this many entries
    Archived { entries: usize },
    /// Page parsed to zero rows; nothing written, retried next run
    Empty,
    /// Another writer archived the date first
    AlreadyArchived,
    /// Cancelled before the page arrived
    Cancelled,
    Failed(FetchError),
}

/// Per-date results of one coordinator run
#[derive(Debug, Default)]
pub struct FetchReport {
    pub archived: BTreeMap<NaiveDate, usize>,
    pub empty: BTreeSet<NaiveDate>,
    pub already_archived: BTreeSet<NaiveDate>,
    pub cancelled: BTreeSet<NaiveDate>,
    pub failed: BTreeMap<NaiveDate, FetchError>,
}

impl FetchReport {
    fn record(&mut self, date: NaiveDate, outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::Archived { entries } => {
                self.archived.insert(date, entries);
            }
            FetchOutcome::Empty => {
                self.empty.insert(date);
            }
            FetchOutcome::AlreadyArchived => {
                self.already_archived.insert(date);
            }
            FetchOutcome::Cancelled => {
                self.cancelled.insert(date);
            }
            FetchOutcome::Failed(err) => {
                self.failed.insert(date, err);
            }
        }
    }

    /// Dates archived by this run
    pub fn succeeded(&self) -> BTreeSet<NaiveDate> {
        self.archived.keys().copied().collect()
    }

    /// Number of dates the run attempted
    pub fn total(&self) -> usize {
        self.archived.len()
            + self.empty.len()
            + self.already_archived.len()
            + self.cancelled.len()
            + self.failed.len()
    }

    /// True when no date failed; empty and cancelled dates are not failures
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Everything one per-date task needs
struct FetchTask {
    date: NaiveDate,
    source: Arc<dyn ChartSource>,
    store: Arc<dyn ArchiveStore>,
    request_timeout: Duration,
    cancel: CancellationToken,
}

impl FetchTask {
    async fn run(self) -> FetchOutcome {
        if self.cancel.is_cancelled() {
            return FetchOutcome::Cancelled;
        }

        match self.store.exists(self.date).await {
            Ok(true) => return FetchOutcome::AlreadyArchived,
            Ok(false) => {}
            Err(e) => return FetchOutcome::Failed(e.into()),
        }

        // Spacing is waited out before the request timeout starts
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return FetchOutcome::Cancelled,
            _ = self.source.ready() => {}
        }

        let request = tokio::time::timeout(self.request_timeout, self.source.fetch(self.date));
        let markup = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return FetchOutcome::Cancelled,
            result = request => match result {
                Ok(Ok(markup)) => markup,
                Ok(Err(e)) => return FetchOutcome::Failed(e.into()),
                Err(_) => {
                    return FetchOutcome::Failed(TransportError::Timeout(self.request_timeout).into())
                }
            },
        };

        match self.archive(&markup).await {
            Ok(outcome) => outcome,
            Err(FetchError::Store(StoreError::AlreadyExists(_))) => FetchOutcome::AlreadyArchived,
            Err(e) => FetchOutcome::Failed(e),
        }
    }

    async fn archive(&self, markup: &str) -> Result<FetchOutcome, FetchError> {
        let entries = parser::parse(markup)?;
        if entries.is_empty() {
            return Ok(FetchOutcome::Empty);
        }

        let snapshot = ChartSnapshot::new(self.date, entries);
        snapshot.validate().map_err(FetchError::Malformed)?;
        self.store.write(&snapshot).await?;

        Ok(FetchOutcome::Archived {
            entries: snapshot.len(),
        })
    }
}

/// Runs per-date fetch tasks against one source and one archive
pub struct FetchCoordinator {
    source: Arc<dyn ChartSource>,
    store: Arc<dyn ArchiveStore>,
    request_timeout: Duration,
}

impl FetchCoordinator {
    pub fn new(
        source: Arc<dyn ChartSource>,
        store: Arc<dyn ArchiveStore>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            source,
            store,
            request_timeout,
        }
    }

    /// Fetch and archive every target date with at most `limit` in flight
    ///
    /// Duplicate targets are collapsed. A `limit` of zero is treated as one.
    pub async fn run(
        &self,
        targets: Vec<NaiveDate>,
        limit: usize,
        cancel: &CancellationToken,
    ) -> FetchReport {
        let targets: BTreeSet<NaiveDate> = targets.into_iter().collect();
        let total = targets.len();
        let limit = limit.max(1);

        info!(
            dates = total,
            limit,
            backend = self.store.backend(),
            "Starting chart fetch"
        );

        let completed = Arc::new(AtomicUsize::new(0));

        let outcomes: Vec<(NaiveDate, FetchOutcome)> = stream::iter(targets)
            .map(|date| {
                let task = FetchTask {
                    date,
                    source: self.source.clone(),
                    store: self.store.clone(),
                    request_timeout: self.request_timeout,
                    cancel: cancel.clone(),
                };
                let completed = completed.clone();

                async move {
                    let outcome = task.run().await;

                    match &outcome {
                        FetchOutcome::Archived { entries } => {
                            debug!(%date, entries, "Chart archived");
                        }
                        FetchOutcome::Empty => warn!(%date, "Chart page had no entries"),
                        FetchOutcome::AlreadyArchived => debug!(%date, "Chart already archived"),
                        FetchOutcome::Cancelled => {}
                        FetchOutcome::Failed(e) => warn!(%date, error = %e, "Chart fetch failed"),
                    }

                    let current = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    if current % 10 == 0 || current == total {
                        info!(progress = format!("{}/{}", current, total), "Fetch progress");
                    }

                    (date, outcome)
                }
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        let mut report = FetchReport::default();
        for (date, outcome) in outcomes {
            report.record(date, outcome);
        }

        info!(
            archived = report.archived.len(),
            empty = report.empty.len(),
            already_archived = report.already_archived.len(),
            cancelled = report.cancelled.len(),
            failed = report.failed.len(),
            "Chart fetch completed"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::client::RateLimiter;
    use crate::parser::fixtures::{chart_page, page, row};
    use crate::store::FileArchive;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    /// Serves canned pages; dates without one get a 404
    struct CannedSource {
        pages: HashMap<NaiveDate, String>,
        delay: Duration,
    }

    #[async_trait]
    impl ChartSource for CannedSource {
        async fn fetch(&self, date: NaiveDate) -> Result<String, TransportError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.pages.get(&date).cloned().ok_or(TransportError::Status {
                status: 404,
                url: date.to_string(),
            })
        }
    }

    fn coordinator(
        pages: HashMap<NaiveDate, String>,
        delay: Duration,
        timeout: Duration,
    ) -> (FetchCoordinator, Arc<FileArchive>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileArchive::open(dir.path()).unwrap());
        let source = Arc::new(CannedSource { pages, delay });
        (FetchCoordinator::new(source, store.clone(), timeout), store, dir)
    }

    #[tokio::test]
    async fn test_archives_each_page() {
        let pages = HashMap::from([
            (d(2000, 1, 2), chart_page(3)),
            (d(2000, 1, 9), chart_page(2)),
        ]);
        let (coordinator, store, _dir) = coordinator(pages, Duration::ZERO, Duration::from_secs(5));

        let report = coordinator
            .run(vec![d(2000, 1, 2), d(2000, 1, 9)], 5, &CancellationToken::new())
            .await;

        assert!(report.is_success());
        assert_eq!(report.succeeded().len(), 2);
        assert_eq!(report.archived.get(&d(2000, 1, 2)), Some(&3));
        assert_eq!(report.archived.get(&d(2000, 1, 9)), Some(&2));
        assert_eq!(store.list_dates().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_isolated_to_its_date() {
        let pages = HashMap::from([(d(2000, 1, 2), chart_page(3))]);
        let (coordinator, store, _dir) = coordinator(pages, Duration::ZERO, Duration::from_secs(5));

        let report = coordinator
            .run(vec![d(2000, 1, 2), d(2000, 1, 9)], 2, &CancellationToken::new())
            .await;

        assert!(!report.is_success());
        assert!(matches!(
            report.failed.get(&d(2000, 1, 9)),
            Some(FetchError::Transport(TransportError::Status { status: 404, .. }))
        ));
        assert!(store.exists(d(2000, 1, 2)).await.unwrap());
        assert!(!store.exists(d(2000, 1, 9)).await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_page_is_not_archived() {
        let pages = HashMap::from([(d(2000, 1, 2), page(&[]))]);
        let (coordinator, store, _dir) = coordinator(pages, Duration::ZERO, Duration::from_secs(5));

        let report = coordinator
            .run(vec![d(2000, 1, 2)], 1, &CancellationToken::new())
            .await;

        assert!(report.is_success());
        assert!(report.empty.contains(&d(2000, 1, 2)));
        assert!(!store.exists(d(2000, 1, 2)).await.unwrap());
    }

    #[tokio::test]
    async fn test_unparseable_page_fails() {
        let bad = page(&[row("1", "Song", "Artist", "-", "one", "1")]);
        let pages = HashMap::from([(d(2000, 1, 2), bad)]);
        let (coordinator, store, _dir) = coordinator(pages, Duration::ZERO, Duration::from_secs(5));

        let report = coordinator
            .run(vec![d(2000, 1, 2)], 1, &CancellationToken::new())
            .await;

        assert!(matches!(report.failed.get(&d(2000, 1, 2)), Some(FetchError::Parse(_))));
        assert!(store.list_dates().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_position_gap_is_malformed() {
        let gapped = page(&[
            row("1", "A", "X", "-", "1", "1"),
            row("3", "B", "Y", "-", "3", "1"),
        ]);
        let pages = HashMap::from([(d(2000, 1, 2), gapped)]);
        let (coordinator, store, _dir) = coordinator(pages, Duration::ZERO, Duration::from_secs(5));

        let report = coordinator
            .run(vec![d(2000, 1, 2)], 1, &CancellationToken::new())
            .await;

        assert!(matches!(report.failed.get(&d(2000, 1, 2)), Some(FetchError::Malformed(_))));
        assert!(!store.exists(d(2000, 1, 2)).await.unwrap());
    }

    #[tokio::test]
    async fn test_slow_source_times_out() {
        let pages = HashMap::from([(d(2000, 1, 2), chart_page(1))]);
        let (coordinator, store, _dir) =
            coordinator(pages, Duration::from_millis(500), Duration::from_millis(50));

        let report = coordinator
            .run(vec![d(2000, 1, 2)], 1, &CancellationToken::new())
            .await;

        assert!(matches!(
            report.failed.get(&d(2000, 1, 2)),
            Some(FetchError::Transport(TransportError::Timeout(_)))
        ));
        assert!(!store.exists(d(2000, 1, 2)).await.unwrap());
    }

    /// Answers instantly but spaces request starts like the HTTP source
    struct SpacedSource {
        limiter: RateLimiter,
    }

    #[async_trait]
    impl ChartSource for SpacedSource {
        async fn ready(&self) {
            self.limiter.wait().await;
        }

        async fn fetch(&self, _date: NaiveDate) -> Result<String, TransportError> {
            Ok(chart_page(2))
        }
    }

    #[tokio::test]
    async fn test_request_spacing_does_not_count_against_timeout() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileArchive::open(dir.path()).unwrap());
        let source = Arc::new(SpacedSource {
            limiter: RateLimiter::new(Duration::from_millis(100)),
        });
        // Four tasks start together; the last one waits ~300ms for its slot
        let coordinator = FetchCoordinator::new(source, store.clone(), Duration::from_millis(150));
        let targets = vec![d(2000, 1, 2), d(2000, 1, 9), d(2000, 1, 16), d(2000, 1, 23)];

        let report = coordinator.run(targets, 4, &CancellationToken::new()).await;

        assert!(report.is_success(), "failures: {:?}", report.failed);
        assert_eq!(report.archived.len(), 4);
        assert_eq!(store.list_dates().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_request_slot() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileArchive::open(dir.path()).unwrap());
        let source = Arc::new(SpacedSource {
            limiter: RateLimiter::new(Duration::from_secs(10)),
        });
        let coordinator = FetchCoordinator::new(source, store.clone(), Duration::from_secs(5));
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let report = coordinator.run(vec![d(2000, 1, 2), d(2000, 1, 9)], 2, &cancel).await;

        assert_eq!(report.archived.len(), 1);
        assert_eq!(report.cancelled.len(), 1);
        assert_eq!(store.list_dates().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_existing_date_is_skipped() {
        let pages = HashMap::from([(d(2000, 1, 2), chart_page(2))]);
        let (coordinator, _store, _dir) = coordinator(pages, Duration::ZERO, Duration::from_secs(5));
        let cancel = CancellationToken::new();

        coordinator.run(vec![d(2000, 1, 2)], 1, &cancel).await;
        let second = coordinator.run(vec![d(2000, 1, 2)], 1, &cancel).await;

        assert!(second.archived.is_empty());
        assert!(second.already_archived.contains(&d(2000, 1, 2)));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_touches_nothing() {
        let pages = HashMap::from([(d(2000, 1, 2), chart_page(2))]);
        let (coordinator, store, _dir) = coordinator(pages, Duration::ZERO, Duration::from_secs(5));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = coordinator.run(vec![d(2000, 1, 2), d(2000, 1, 9)], 2, &cancel).await;

        assert_eq!(report.cancelled.len(), 2);
        assert!(report.is_success());
        assert!(store.list_dates().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_targets_are_collapsed() {
        let pages = HashMap::from([(d(2000, 1, 2), chart_page(1))]);
        let (coordinator, _store, _dir) = coordinator(pages, Duration::ZERO, Duration::from_secs(5));

        let report = coordinator
            .run(vec![d(2000, 1, 2), d(2000, 1, 2)], 0, &CancellationToken::new())
            .await;

        assert_eq!(report.total(), 1);
        assert_eq!(report.archived.len(), 1);
    }
}
