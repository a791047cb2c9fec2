//! Date utilities and the chart publication cadence

use crate::{Error, Result};
use chrono::{Duration, Local, NaiveDate};

/// ISO date format used for chart URLs and archive file names
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Get the current local calendar date
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Parse an ISO `YYYY-MM-DD` date
pub fn parse_date(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT)
        .map_err(|e| Error::InvalidInput(format!("invalid date {:?}: {}", text, e)))
}

/// Fixed publication cadence
///
/// Boundaries are `anchor + k * period` for every integer `k`, so the anchor
/// may be any past or future boundary date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    anchor: NaiveDate,
    period_days: i64,
}

impl Cadence {
    /// Create a cadence; `period_days` must be positive
    pub fn new(anchor: NaiveDate, period_days: i64) -> Result<Self> {
        if period_days <= 0 {
            return Err(Error::InvalidInput(format!(
                "cadence period must be positive, got {} days",
                period_days
            )));
        }
        Ok(Self {
            anchor,
            period_days,
        })
    }

    /// Weekly cadence on Sundays (2000-01-02 is a Sunday)
    pub fn weekly() -> Self {
        Self {
            anchor: NaiveDate::from_ymd_opt(2000, 1, 2).unwrap_or_default(),
            period_days: 7,
        }
    }

    pub fn anchor(&self) -> NaiveDate {
        self.anchor
    }

    pub fn period(&self) -> Duration {
        Duration::days(self.period_days)
    }

    pub fn is_boundary(&self, date: NaiveDate) -> bool {
        self.offset(date) == 0
    }

    /// First boundary on or after `date`
    pub fn align_up(&self, date: NaiveDate) -> NaiveDate {
        match self.offset(date) {
            0 => date,
            rem => date + Duration::days(self.period_days - rem),
        }
    }

    /// Boundaries in `[from, until)`, ascending, starting at `align_up(from)`
    pub fn boundaries(&self, from: NaiveDate, until: NaiveDate) -> Vec<NaiveDate> {
        let mut dates = Vec::new();
        let mut current = self.align_up(from);
        while current < until {
            dates.push(current);
            current += self.period();
        }
        dates
    }

    fn offset(&self, date: NaiveDate) -> i64 {
        (date - self.anchor).num_days().rem_euclid(self.period_days)
    }
}

impl Default for Cadence {
    fn default() -> Self {
        Self::weekly()
    }
}
