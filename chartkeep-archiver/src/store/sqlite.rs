//! SQLite archive backend
//!
//! Snapshots are rows of `chart_entries`, keyed by `(chart_date, position)`.
//! All rows of one snapshot are inserted in a single transaction, so a chart
//! date is either fully present or absent.
//!
//! The backend can also compute the all-time ranking in SQL with a windowed
//! `DENSE_RANK()`; that path always uses the dense rank policy.

use super::{ArchiveStore, StoreError, StoreResult};
use crate::ranking::RankedEntry;
use async_trait::async_trait;
use chartkeep_common::models::normalize;
use chartkeep_common::time::{parse_date, DATE_FORMAT};
use chartkeep_common::{ChartEntry, ChartSnapshot, Song};
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// SQLite-backed chart archive
#[derive(Debug, Clone)]
pub struct SqliteArchive {
    pool: SqlitePool,
}

impl SqliteArchive {
    /// Open (creating if needed) the archive database at `db_path`
    pub async fn open(db_path: &Path) -> StoreResult<Self> {
        let newly_created = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // WAL lets readers proceed while a fetch task commits a snapshot
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(5000));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        if newly_created {
            info!("Initialized new archive database: {}", db_path.display());
        } else {
            info!("Opened existing archive database: {}", db_path.display());
        }

        Self::with_pool(pool).await
    }

    /// Private in-memory archive (single connection)
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> StoreResult<Self> {
        init_tables(&pool).await?;
        Ok(Self { pool })
    }

    /// All-time ranking computed by SQLite using `DENSE_RANK()`
    ///
    /// Scores are `chart_size + 1 - position` summed per normalized
    /// `(title, artist)`. Ordering matches the in-process aggregator:
    /// score descending, first appearance ascending, then the normalized
    /// title and artist. Display text comes from the earliest appearance.
    ///
    /// Fails with [`StoreError::Corrupt`] if any archived date breaks the
    /// chart model, exactly where the in-process aggregator would.
    pub async fn dense_ranking(&self, chart_size: u32) -> StoreResult<Vec<RankedEntry>> {
        self.check_rankable(chart_size).await?;

        let rows = sqlx::query(
            r#"
            WITH songs AS (
                SELECT title_key,
                       artist_key,
                       MIN(chart_date) AS first_seen,
                       SUM(? + 1 - position) AS score
                FROM chart_entries
                GROUP BY title_key, artist_key
            )
            SELECT DENSE_RANK() OVER (ORDER BY s.score DESC) AS song_rank,
                   s.score,
                   s.first_seen,
                   (SELECT e.title FROM chart_entries e
                     WHERE e.title_key = s.title_key AND e.artist_key = s.artist_key
                     ORDER BY e.chart_date, e.position LIMIT 1) AS title,
                   (SELECT e.artist FROM chart_entries e
                     WHERE e.title_key = s.title_key AND e.artist_key = s.artist_key
                     ORDER BY e.chart_date, e.position LIMIT 1) AS artist
            FROM songs s
            ORDER BY s.score DESC, s.first_seen ASC, s.title_key ASC, s.artist_key ASC
            "#,
        )
        .bind(i64::from(chart_size))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> StoreResult<RankedEntry> {
                let first_seen: String = row.try_get("first_seen")?;
                let rank: i64 = row.try_get("song_rank")?;
                let score: i64 = row.try_get("score")?;
                let title: String = row.try_get("title")?;
                let artist: String = row.try_get("artist")?;
                Ok(RankedEntry {
                    song: Song::new(&title, &artist),
                    score: score as u64,
                    first_seen: parse_date(&first_seen)?,
                    rank: rank as u32,
                })
            })
            .collect()
    }

    /// Reject the first date whose rows are not a contiguous, well-formed
    /// chart of at most `chart_size` entries
    async fn check_rankable(&self, chart_size: u32) -> StoreResult<()> {
        if chart_size == 0 {
            return Err(chartkeep_common::Error::InvalidInput(
                "chart size must be at least 1".to_string(),
            )
            .into());
        }

        // Positions are unique per date (primary key), so MIN = 1 and
        // MAX = COUNT together mean exactly 1..N
        let bad = sqlx::query(
            r#"
            SELECT chart_date,
                   COUNT(*) AS entries,
                   MIN(position) AS lowest,
                   MAX(position) AS highest
            FROM chart_entries
            GROUP BY chart_date
            HAVING MIN(position) <> 1
                OR MAX(position) <> COUNT(*)
                OR COUNT(*) > ?
                OR MIN(LENGTH(title_key)) = 0
                OR MIN(LENGTH(artist_key)) = 0
                OR MIN(peak_position) < 1
                OR MIN(weeks_on_chart) < 1
            ORDER BY chart_date
            LIMIT 1
            "#,
        )
        .bind(i64::from(chart_size))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = bad else {
            return Ok(());
        };

        let date = parse_date(&row.try_get::<String, _>("chart_date")?)?;
        let entries: i64 = row.try_get("entries")?;
        let lowest: i64 = row.try_get("lowest")?;
        let highest: i64 = row.try_get("highest")?;
        let reason = if entries > i64::from(chart_size) {
            format!("{} entries exceed the chart size of {}", entries, chart_size)
        } else if lowest != 1 || highest != entries {
            format!("positions {}..={} over {} rows are not contiguous", lowest, highest, entries)
        } else {
            "an entry has an empty title or artist, or a zero peak or weeks value".to_string()
        };

        Err(StoreError::Corrupt { date, reason })
    }
}

/// Create the archive table if it doesn't exist
async fn init_tables(pool: &SqlitePool) -> StoreResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chart_entries (
            chart_date TEXT NOT NULL,
            position INTEGER NOT NULL CHECK (position >= 1),
            title TEXT NOT NULL,
            artist TEXT NOT NULL,
            title_key TEXT NOT NULL,
            artist_key TEXT NOT NULL,
            last_week_position INTEGER NOT NULL DEFAULT 0,
            peak_position INTEGER NOT NULL,
            weeks_on_chart INTEGER NOT NULL,
            PRIMARY KEY (chart_date, position)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chart_entries_song ON chart_entries (title_key, artist_key)",
    )
    .execute(pool)
    .await?;

    debug!("Archive tables initialized (chart_entries)");
    Ok(())
}

fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

#[async_trait]
impl ArchiveStore for SqliteArchive {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn exists(&self, date: NaiveDate) -> StoreResult<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM chart_entries WHERE chart_date = ? LIMIT 1")
                .bind(date_key(date))
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn read(&self, date: NaiveDate) -> StoreResult<Option<ChartSnapshot>> {
        let rows = sqlx::query(
            r#"
            SELECT position, title, artist, last_week_position, peak_position, weeks_on_chart
            FROM chart_entries
            WHERE chart_date = ?
            ORDER BY position
            "#,
        )
        .bind(date_key(date))
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        let entries = rows
            .iter()
            .map(|row| {
                Ok(ChartEntry {
                    position: row.try_get::<i64, _>("position")? as u32,
                    title: row.try_get("title")?,
                    artist: row.try_get("artist")?,
                    last_week_position: row.try_get::<i64, _>("last_week_position")? as u32,
                    peak_position: row.try_get::<i64, _>("peak_position")? as u32,
                    weeks_on_chart: row.try_get::<i64, _>("weeks_on_chart")? as u32,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        Ok(Some(ChartSnapshot::new(date, entries)))
    }

    async fn write(&self, snapshot: &ChartSnapshot) -> StoreResult<()> {
        if snapshot.is_empty() {
            return Err(StoreError::EmptySnapshot(snapshot.date));
        }

        let date = date_key(snapshot.date);
        let mut tx = self.pool.begin().await?;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM chart_entries WHERE chart_date = ? LIMIT 1")
                .bind(&date)
                .fetch_optional(&mut *tx)
                .await?;
        if existing.is_some() {
            return Err(StoreError::AlreadyExists(snapshot.date));
        }

        for entry in &snapshot.entries {
            sqlx::query(
                r#"
                INSERT INTO chart_entries (
                    chart_date, position, title, artist, title_key, artist_key,
                    last_week_position, peak_position, weeks_on_chart
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&date)
            .bind(i64::from(entry.position))
            .bind(&entry.title)
            .bind(&entry.artist)
            .bind(normalize(&entry.title))
            .bind(normalize(&entry.artist))
            .bind(i64::from(entry.last_week_position))
            .bind(i64::from(entry.peak_position))
            .bind(i64::from(entry.weeks_on_chart))
            .execute(&mut *tx)
            .await?;
        }

        // Dropping `tx` on any early return above rolls back
        tx.commit().await?;

        debug!(date = %snapshot.date, entries = snapshot.len(), "Snapshot written to sqlite archive");
        Ok(())
    }

    async fn list_dates(&self) -> StoreResult<BTreeSet<NaiveDate>> {
        let keys: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT chart_date FROM chart_entries ORDER BY chart_date")
                .fetch_all(&self.pool)
                .await?;

        keys.iter()
            .map(|key| parse_date(key).map_err(StoreError::from))
            .collect()
    }
}
