//! Chart data model
//!
//! A [`ChartSnapshot`] is the full published list for one chart date. It is
//! written once and never mutated. [`Song`] is the identity of a work across
//! snapshots; it is derived during aggregation and never stored.

use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// One row of a published snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartEntry {
    /// 1-based rank within the snapshot
    pub position: u32,
    pub title: String,
    pub artist: String,
    /// Previous week's position, 0 when the entry was not ranked last week
    pub last_week_position: u32,
    pub peak_position: u32,
    pub weeks_on_chart: u32,
}

impl ChartEntry {
    /// Identity of the work this entry refers to
    pub fn song(&self) -> Song {
        Song::new(&self.title, &self.artist)
    }
}

/// The complete published list for one chart date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartSnapshot {
    pub date: NaiveDate,
    /// Entries ordered by position ascending
    pub entries: Vec<ChartEntry>,
}

impl ChartSnapshot {
    /// Build a snapshot, ordering entries by position
    pub fn new(date: NaiveDate, mut entries: Vec<ChartEntry>) -> Self {
        entries.sort_by_key(|e| e.position);
        Self { date, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check the snapshot against the data model invariants
    ///
    /// Positions must form exactly `{1..N}` in ascending order, text fields
    /// must be non-empty, and peak/weeks counters must be at least 1.
    pub fn validate(&self) -> Result<()> {
        for (index, entry) in self.entries.iter().enumerate() {
            let expected = index as u32 + 1;
            if entry.position != expected {
                return Err(self.invalid(format!(
                    "expected position {} at row {}, found {}",
                    expected, index, entry.position
                )));
            }
            if entry.title.trim().is_empty() || entry.artist.trim().is_empty() {
                return Err(self.invalid(format!(
                    "position {} has an empty title or artist",
                    entry.position
                )));
            }
            if entry.peak_position == 0 || entry.weeks_on_chart == 0 {
                return Err(self.invalid(format!(
                    "position {} has a zero peak position or weeks on chart",
                    entry.position
                )));
            }
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> Error {
        Error::InvalidSnapshot {
            date: self.date,
            reason,
        }
    }
}

/// Identity of a work: the normalized `(title, artist)` pair
///
/// Equality, hashing and ordering use the normalized form only, so
/// `"Back At One"` by `"Brian  McKnight"` and `"back at one"` by
/// `"Brian McKnight"` are the same song. The display strings keep the text
/// they were first built from.
#[derive(Debug, Clone)]
pub struct Song {
    title: String,
    artist: String,
    key: (String, String),
}

impl Song {
    pub fn new(title: &str, artist: &str) -> Self {
        Self {
            title: title.trim().to_string(),
            artist: artist.trim().to_string(),
            key: (normalize(title), normalize(artist)),
        }
    }

    /// Display title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Display artist
    pub fn artist(&self) -> &str {
        &self.artist
    }

    pub fn normalized_title(&self) -> &str {
        &self.key.0
    }

    pub fn normalized_artist(&self) -> &str {
        &self.key.1
    }
}

impl PartialEq for Song {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Song {}

impl Hash for Song {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for Song {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Song {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

/// Lowercase, trim, and collapse internal whitespace runs to a single space
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
