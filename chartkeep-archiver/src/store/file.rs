//! File-per-date archive backend
//!
//! Each snapshot is stored as `<archive_dir>/<YYYY-MM-DD>.json`. Writes go
//! through a `.tmp` sibling and a rename, so a crash mid-write leaves only a
//! temp file, which enumeration ignores.
//!
//! Files written by the earlier scraper layout
//! (`{"YYYY-MM-DD": [[position, title, artist, last, peak, weeks], ...]}`)
//! are still readable.

use super::{ArchiveStore, StoreError, StoreResult};
use async_trait::async_trait;
use chartkeep_common::time::DATE_FORMAT;
use chartkeep_common::{fsutil, ChartEntry, ChartSnapshot};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{debug, warn};

const EXTENSION: &str = "json";

/// Row tuple of the legacy on-disk layout
type LegacyRow = (u32, String, String, u32, u32, u32);

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredSnapshot {
    Current(ChartSnapshot),
    Legacy(BTreeMap<NaiveDate, Vec<LegacyRow>>),
}

/// Directory of JSON snapshot files
#[derive(Debug, Clone)]
pub struct FileArchive {
    dir: PathBuf,
}

impl FileArchive {
    /// Open (and create if needed) an archive directory
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "Opened file archive");
        Ok(Self { dir })
    }

    fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}.{}", date.format(DATE_FORMAT), EXTENSION))
    }
}

/// Chart date encoded in an archive file name, if it is one
fn date_from_file_name(name: &str) -> Option<NaiveDate> {
    let stem = name.strip_suffix(".json")?;
    NaiveDate::parse_from_str(stem, DATE_FORMAT).ok()
}

fn decode(date: NaiveDate, content: &str) -> StoreResult<ChartSnapshot> {
    let corrupt = |reason: String| StoreError::Corrupt { date, reason };

    let stored: StoredSnapshot =
        serde_json::from_str(content).map_err(|e| corrupt(e.to_string()))?;

    let snapshot = match stored {
        StoredSnapshot::Current(snapshot) => snapshot,
        StoredSnapshot::Legacy(mut by_date) => {
            let rows = by_date
                .remove(&date)
                .ok_or_else(|| corrupt("legacy file does not contain its own date".to_string()))?;
            let entries = rows
                .into_iter()
                .map(|(position, title, artist, last_week_position, peak_position, weeks_on_chart)| {
                    ChartEntry {
                        position,
                        title,
                        artist,
                        last_week_position,
                        peak_position,
                        weeks_on_chart,
                    }
                })
                .collect();
            ChartSnapshot::new(date, entries)
        }
    };

    if snapshot.date != date {
        return Err(corrupt(format!(
            "file contains snapshot dated {}",
            snapshot.date
        )));
    }
    Ok(snapshot)
}

#[async_trait]
impl ArchiveStore for FileArchive {
    fn backend(&self) -> &'static str {
        "file"
    }

    async fn exists(&self, date: NaiveDate) -> StoreResult<bool> {
        Ok(tokio::fs::try_exists(self.path_for(date)).await?)
    }

    async fn read(&self, date: NaiveDate) -> StoreResult<Option<ChartSnapshot>> {
        match tokio::fs::read_to_string(self.path_for(date)).await {
            Ok(content) => decode(date, &content).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, snapshot: &ChartSnapshot) -> StoreResult<()> {
        if snapshot.is_empty() {
            return Err(StoreError::EmptySnapshot(snapshot.date));
        }

        let path = self.path_for(snapshot.date);
        if tokio::fs::try_exists(&path).await? {
            return Err(StoreError::AlreadyExists(snapshot.date));
        }

        let content = serde_json::to_vec(snapshot).map_err(chartkeep_common::Error::from)?;
        tokio::task::spawn_blocking(move || fsutil::write_atomic(&path, &content)).await??;

        debug!(date = %snapshot.date, entries = snapshot.len(), "Snapshot written to file archive");
        Ok(())
    }

    async fn list_dates(&self) -> StoreResult<BTreeSet<NaiveDate>> {
        let mut dates = BTreeSet::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            match date_from_file_name(name) {
                Some(date) => {
                    dates.insert(date);
                }
                None if name.ends_with(fsutil::TEMP_SUFFIX) => {
                    warn!(file = name, "Ignoring interrupted archive write");
                }
                None => {}
            }
        }

        Ok(dates)
    }
}
