//! Missing chart date detection
//!
//! Computes which cadence boundaries between the start date and today have
//! no snapshot in the archive. Results are oldest first so that a partially
//! successful run still fills the archive from the front.

use chartkeep_common::Cadence;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// How a run decides where to resume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResumePolicy {
    /// True set difference over the whole range; retries interior gaps
    #[default]
    FullGap,
    /// Only dates after the newest archived date. Assumes the archive has
    /// no interior gaps, which holds only when every write is verified
    /// before moving on.
    HighWatermark,
}

impl FromStr for ResumePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full-gap" | "full_gap" => Ok(Self::FullGap),
            "high-watermark" | "high_watermark" => Ok(Self::HighWatermark),
            other => Err(format!("unknown resume policy: {}", other)),
        }
    }
}

impl fmt::Display for ResumePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullGap => write!(f, "full-gap"),
            Self::HighWatermark => write!(f, "high-watermark"),
        }
    }
}

/// Chart dates in `[align_up(start), today)` that are not archived
///
/// `today` itself is excluded: the chart dated today is not considered
/// published yet.
pub fn missing_dates(
    cadence: &Cadence,
    start: NaiveDate,
    today: NaiveDate,
    archived: &BTreeSet<NaiveDate>,
    policy: ResumePolicy,
) -> Vec<NaiveDate> {
    let from = match policy {
        ResumePolicy::FullGap => start,
        ResumePolicy::HighWatermark => match archived.last() {
            Some(newest) => (*newest + cadence.period()).max(start),
            None => start,
        },
    };

    let missing: Vec<NaiveDate> = cadence
        .boundaries(from, today)
        .into_iter()
        .filter(|date| !archived.contains(date))
        .collect();

    tracing::debug!(
        %start,
        %today,
        %policy,
        archived = archived.len(),
        missing = missing.len(),
        "Computed missing chart dates"
    );

    missing
}
