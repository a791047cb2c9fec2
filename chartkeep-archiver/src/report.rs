//! Ranking report output
//!
//! Writes `export.json` (`{"data": [{title, artist, rank, score, first_seen}]}`)
//! and a Markdown `README.md` table to the root folder. Both files are
//! replaced atomically.

use crate::ranking::RankedEntry;
use chartkeep_common::{fsutil, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

pub const EXPORT_FILE_NAME: &str = "export.json";
pub const README_FILE_NAME: &str = "README.md";

/// One exported ranking row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow<'a> {
    pub title: &'a str,
    pub artist: &'a str,
    pub rank: u32,
    pub score: u64,
    pub first_seen: NaiveDate,
}

impl<'a> From<&'a RankedEntry> for ReportRow<'a> {
    fn from(entry: &'a RankedEntry) -> Self {
        Self {
            title: entry.song.title(),
            artist: entry.song.artist(),
            rank: entry.rank,
            score: entry.score,
            first_seen: entry.first_seen,
        }
    }
}

#[derive(Serialize)]
struct Export<'a> {
    data: Vec<ReportRow<'a>>,
}

/// Archived date range covered by a ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoveredRange {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl CoveredRange {
    /// Range spanned by `dates`, `None` if empty
    pub fn of<I: IntoIterator<Item = NaiveDate>>(dates: I) -> Option<Self> {
        let mut iter = dates.into_iter();
        let first = iter.next()?;
        let (first, last) = iter.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d)));
        Some(Self { first, last })
    }
}

/// Serialized `export.json` body
pub fn render_json(ranking: &[RankedEntry]) -> Result<String> {
    let export = Export {
        data: ranking.iter().map(ReportRow::from).collect(),
    };
    Ok(serde_json::to_string_pretty(&export)?)
}

/// Markdown table body for `README.md`
pub fn render_markdown(ranking: &[RankedEntry], range: Option<CoveredRange>) -> String {
    let mut out = String::from("# GREATEST SONGS OF THE CENTURY\n\n");

    match range {
        Some(range) => {
            let _ = writeln!(out, "## Ranking [{} - {}]\n", range.first, range.last);
        }
        None => out.push_str("## Ranking [no charts archived]\n\n"),
    }

    out.push_str("| Rank | Title | Artist | First Seen | Score |\n");
    out.push_str("| ---- | ----- | ------ | ---------- | ----- |\n");
    for entry in ranking {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} |",
            entry.rank,
            escape_cell(entry.song.title()),
            escape_cell(entry.song.artist()),
            entry.first_seen,
            entry.score
        );
    }
    out
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

/// Paths of the files written by [`write_report`]
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub export: PathBuf,
    pub readme: PathBuf,
}

/// Write `export.json` and `README.md` into `dir`
pub fn write_report(
    dir: &Path,
    ranking: &[RankedEntry],
    range: Option<CoveredRange>,
) -> Result<ReportPaths> {
    let paths = ReportPaths {
        export: dir.join(EXPORT_FILE_NAME),
        readme: dir.join(README_FILE_NAME),
    };

    fsutil::write_atomic(&paths.export, render_json(ranking)?.as_bytes())?;
    fsutil::write_atomic(&paths.readme, render_markdown(ranking, range).as_bytes())?;

    info!(
        songs = ranking.len(),
        export = %paths.export.display(),
        readme = %paths.readme.display(),
        "Ranking report written"
    );
    Ok(paths)
}
