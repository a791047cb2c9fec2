//! Shared integration test utilities
//!
//! A scripted chart source, a write-counting archive wrapper, and builders
//! for chart page markup in the published row layout.

#![allow(dead_code)]

use async_trait::async_trait;
use chartkeep_archiver::config::{ArchiverConfig, CliOverrides};
use chartkeep_archiver::fetch::{ChartSource, TransportError};
use chartkeep_archiver::store::{ArchiveStore, StoreResult};
use chartkeep_common::config::TomlConfig;
use chartkeep_common::{ChartEntry, ChartSnapshot};
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Consecutive weekly dates starting at `first`
pub fn weeks_from(first: NaiveDate, count: usize) -> Vec<NaiveDate> {
    (0..count)
        .map(|k| first + chrono::Duration::weeks(k as i64))
        .collect()
}

// ============================================================================
// Markup
// ============================================================================

/// One row container with 16 `li` cells
pub fn row(position: u32, title: &str, artist: &str, last: &str, peak: u32, weeks: u32) -> String {
    let mut cells = vec![format!("<li>\n\t{}\n</li>", position)];
    cells.extend((1..4).map(|_| "<li></li>".to_string()));
    cells.push(format!(
        "<li><h3 class=\"c-title\">\n\t\t{}\n\t</h3><span class=\"c-label\">\n\t\t{}\n\t</span></li>",
        title, artist
    ));
    cells.extend((5..13).map(|_| "<li>-</li>".to_string()));
    cells.push(format!("<li>\n\t{}\n</li>", last));
    cells.push(format!("<li>\n\t{}\n</li>", peak));
    cells.push(format!("<li>\n\t{}\n</li>", weeks));

    format!(
        "<div class=\"o-chart-results-list-row-container\"><ul>{}</ul></div>",
        cells.concat()
    )
}

/// Page whose rows hold `songs` in chart order
pub fn page_of(songs: &[(&str, &str)]) -> String {
    let rows: Vec<String> = songs
        .iter()
        .enumerate()
        .map(|(i, (title, artist))| {
            let position = i as u32 + 1;
            row(position, title, artist, "-", position, 1)
        })
        .collect();
    format!(
        "<html><body><div class=\"chart-results\">{}</div></body></html>",
        rows.join("\n")
    )
}

/// Page with `count` distinct songs named after their position
pub fn numbered_page(count: u32) -> String {
    let titles: Vec<(String, String)> = (1..=count)
        .map(|p| (format!("Song {}", p), format!("Artist {}", p)))
        .collect();
    let borrowed: Vec<(&str, &str)> = titles
        .iter()
        .map(|(t, a)| (t.as_str(), a.as_str()))
        .collect();
    page_of(&borrowed)
}

pub fn snapshot_of(date: NaiveDate, songs: &[(&str, &str)]) -> ChartSnapshot {
    let entries = songs
        .iter()
        .enumerate()
        .map(|(i, (title, artist))| ChartEntry {
            position: i as u32 + 1,
            title: title.to_string(),
            artist: artist.to_string(),
            last_week_position: 0,
            peak_position: i as u32 + 1,
            weeks_on_chart: 1,
        })
        .collect();
    ChartSnapshot::new(date, entries)
}

// ============================================================================
// Scripted chart source
// ============================================================================

/// Serves a page for every date; per-date pages and failures are scripted
pub struct ScriptedSource {
    pages: HashMap<NaiveDate, String>,
    default_page: String,
    failing: HashSet<NaiveDate>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(default_page: String) -> Self {
        Self {
            pages: HashMap::new(),
            default_page,
            failing: HashSet::new(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_page(mut self, date: NaiveDate, markup: String) -> Self {
        self.pages.insert(date, markup);
        self
    }

    pub fn failing_on(mut self, date: NaiveDate) -> Self {
        self.failing.insert(date);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight gauge even when the fetch future is dropped
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChartSource for ScriptedSource {
    async fn fetch(&self, date: NaiveDate) -> Result<String, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.failing.contains(&date) {
            return Err(TransportError::Status {
                status: 503,
                url: format!("scripted/{}", date),
            });
        }

        Ok(self
            .pages
            .get(&date)
            .cloned()
            .unwrap_or_else(|| self.default_page.clone()))
    }
}

// ============================================================================
// Write-counting archive
// ============================================================================

/// Wraps an archive and counts successful writes
pub struct CountingStore<S> {
    inner: S,
    writes: AtomicUsize,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            writes: AtomicUsize::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: ArchiveStore> ArchiveStore for CountingStore<S> {
    fn backend(&self) -> &'static str {
        self.inner.backend()
    }

    async fn exists(&self, date: NaiveDate) -> StoreResult<bool> {
        self.inner.exists(date).await
    }

    async fn read(&self, date: NaiveDate) -> StoreResult<Option<ChartSnapshot>> {
        self.inner.read(date).await
    }

    async fn write(&self, snapshot: &ChartSnapshot) -> StoreResult<()> {
        self.inner.write(snapshot).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_dates(&self) -> StoreResult<BTreeSet<NaiveDate>> {
        self.inner.list_dates().await
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Compiled-default config rooted at `root`, starting at `start`
pub fn test_config(root: &Path, start: NaiveDate) -> ArchiverConfig {
    let cli = CliOverrides {
        root_folder: Some(root.to_path_buf()),
        start_date: Some(start),
        ..Default::default()
    };
    let mut config = ArchiverConfig::resolve(&cli, &TomlConfig::default()).unwrap();
    config.request_timeout = Duration::from_secs(5);
    config
}
