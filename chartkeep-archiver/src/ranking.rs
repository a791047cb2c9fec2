//! All-time ranking over the chart archive
//!
//! A pure fold over every archived snapshot, recomputed from scratch on each
//! run. Each appearance at `position` scores `chart_size + 1 - position`, so
//! first place earns `chart_size` points and last place earns one.
//!
//! Songs are ordered by total score descending, then by first appearance
//! (earlier wins), then by normalized title and artist, which makes the order
//! total and the output reproducible. Equal scores always share a rank; the
//! [`RankPolicy`] decides what the next distinct score gets.

use chartkeep_common::{ChartSnapshot, Song};
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Highest position on a published chart
pub const DEFAULT_CHART_SIZE: u32 = 100;

/// How ranks continue after a group of tied scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankPolicy {
    /// Standard competition ranking: 1, 2, 2, 4
    #[default]
    Competition,
    /// Dense ranking, as produced by SQL `DENSE_RANK()`: 1, 2, 2, 3
    Dense,
}

impl FromStr for RankPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "competition" => Ok(Self::Competition),
            "dense" => Ok(Self::Dense),
            other => Err(format!("unknown rank policy: {}", other)),
        }
    }
}

impl fmt::Display for RankPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Competition => write!(f, "competition"),
            Self::Dense => write!(f, "dense"),
        }
    }
}

/// The archive violates the chart data model
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("chart size must be at least 1")]
    ZeroChartSize,

    #[error("snapshot for {0} appears more than once")]
    DuplicateDate(NaiveDate),

    #[error("snapshot for {date} has {entries} entries but the chart size is {chart_size}")]
    Oversized {
        date: NaiveDate,
        entries: usize,
        chart_size: u32,
    },

    #[error(transparent)]
    InvalidSnapshot(#[from] chartkeep_common::Error),
}

/// Accumulated score of one song
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreRecord {
    pub song: Song,
    pub first_seen: NaiveDate,
    pub score: u64,
}

/// One row of the final ranking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedEntry {
    pub song: Song,
    pub score: u64,
    pub first_seen: NaiveDate,
    pub rank: u32,
}

/// Validate the archive and sum scores per song
///
/// Returned records are in order of first appearance.
pub fn score<'a, I>(snapshots: I, chart_size: u32) -> Result<Vec<ScoreRecord>, AggregationError>
where
    I: IntoIterator<Item = &'a ChartSnapshot>,
{
    if chart_size == 0 {
        return Err(AggregationError::ZeroChartSize);
    }

    let mut ordered: Vec<&ChartSnapshot> = snapshots.into_iter().collect();
    ordered.sort_by_key(|s| s.date);

    let mut seen_dates = BTreeSet::new();
    for snapshot in &ordered {
        if !seen_dates.insert(snapshot.date) {
            return Err(AggregationError::DuplicateDate(snapshot.date));
        }
        if snapshot.len() > chart_size as usize {
            return Err(AggregationError::Oversized {
                date: snapshot.date,
                entries: snapshot.len(),
                chart_size,
            });
        }
        snapshot.validate()?;
    }

    let mut index: HashMap<Song, usize> = HashMap::new();
    let mut records: Vec<ScoreRecord> = Vec::new();

    for snapshot in ordered {
        for entry in &snapshot.entries {
            let points = u64::from(chart_size) + 1 - u64::from(entry.position);
            let song = entry.song();
            match index.get(&song) {
                Some(&i) => records[i].score += points,
                None => {
                    index.insert(song.clone(), records.len());
                    records.push(ScoreRecord {
                        song,
                        first_seen: snapshot.date,
                        score: points,
                    });
                }
            }
        }
    }

    Ok(records)
}

/// Order score records and assign ranks under `policy`
pub fn rank(mut records: Vec<ScoreRecord>, policy: RankPolicy) -> Vec<RankedEntry> {
    records.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.first_seen.cmp(&b.first_seen))
            .then_with(|| a.song.cmp(&b.song))
    });

    let mut ranked: Vec<RankedEntry> = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        let rank = match ranked.last() {
            Some(prev) if prev.score == record.score => prev.rank,
            Some(prev) => match policy {
                RankPolicy::Competition => index as u32 + 1,
                RankPolicy::Dense => prev.rank + 1,
            },
            None => 1,
        };
        ranked.push(RankedEntry {
            song: record.song,
            score: record.score,
            first_seen: record.first_seen,
            rank,
        });
    }
    ranked
}

/// Full aggregation: validate, score, order, rank
pub fn aggregate<'a, I>(
    snapshots: I,
    chart_size: u32,
    policy: RankPolicy,
) -> Result<Vec<RankedEntry>, AggregationError>
where
    I: IntoIterator<Item = &'a ChartSnapshot>,
{
    let records = score(snapshots, chart_size)?;
    let ranked = rank(records, policy);
    tracing::debug!(songs = ranked.len(), %policy, "Aggregated all-time ranking");
    Ok(ranked)
}
