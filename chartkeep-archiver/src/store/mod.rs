//! Chart archive storage
//!
//! The archive is a durable mapping from chart date to [`ChartSnapshot`].
//! Every backend guarantees that `write` is atomic per date: after a failed
//! write, `exists`, `read` and `list_dates` behave as if it never happened.
//! A date that is already archived is never overwritten.

pub mod file;
pub mod sqlite;

use async_trait::async_trait;
use chartkeep_common::ChartSnapshot;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use thiserror::Error;

pub use file::FileArchive;
pub use sqlite::SqliteArchive;

/// Archive storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot for {0} is already archived")]
    AlreadyExists(NaiveDate),

    #[error("refusing to archive empty snapshot for {0}")]
    EmptySnapshot(NaiveDate),

    #[error("archived snapshot for {date} is unreadable: {reason}")]
    Corrupt { date: NaiveDate, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Common(#[from] chartkeep_common::Error),

    #[error("background write task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Read/write contract of the chart archive
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Short backend name for logging
    fn backend(&self) -> &'static str;

    async fn exists(&self, date: NaiveDate) -> StoreResult<bool>;

    async fn read(&self, date: NaiveDate) -> StoreResult<Option<ChartSnapshot>>;

    /// Persist a snapshot atomically; fails if the date is already archived
    async fn write(&self, snapshot: &ChartSnapshot) -> StoreResult<()>;

    async fn list_dates(&self) -> StoreResult<BTreeSet<NaiveDate>>;

    /// Every archived snapshot, oldest first
    async fn snapshots(&self) -> StoreResult<Vec<ChartSnapshot>> {
        let mut snapshots = Vec::new();
        for date in self.list_dates().await? {
            match self.read(date).await? {
                Some(snapshot) => snapshots.push(snapshot),
                None => {
                    return Err(StoreError::Corrupt {
                        date,
                        reason: "listed but not readable".to_string(),
                    })
                }
            }
        }
        Ok(snapshots)
    }
}
