//! Chart page record parser
//!
//! Pure function from raw chart markup to ordered [`ChartEntry`] rows. Each
//! ranked row lives in a `div.o-chart-results-list-row-container`; its `li`
//! descendants are enumerated in document order and the fields are read at
//! fixed offsets:
//!
//! | offset | field                                         |
//! |--------|-----------------------------------------------|
//! | 0      | position (`NEW` / `RE-ENTRY` badges removed)  |
//! | 4      | title (first `h3`) and artist (first `span`)  |
//! | 13     | last week position (`-` means not ranked)     |
//! | 14     | peak position                                 |
//! | 15     | weeks on chart                                |
//!
//! A page without row containers parses to an empty list. A row that is
//! present but malformed fails the whole page: a partially parsed chart
//! would look complete to everything downstream.

use chartkeep_common::ChartEntry;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use thiserror::Error;

const ROW_SELECTOR: &str = "div.o-chart-results-list-row-container";

const POSITION_CELL: usize = 0;
const TITLE_CELL: usize = 4;
const LAST_WEEK_CELL: usize = 13;
const PEAK_CELL: usize = 14;
const WEEKS_CELL: usize = 15;

/// Badges rendered inside the position cell
const POSITION_MARKERS: [&str; 2] = ["RE-ENTRY", "NEW"];

/// Placeholder for "not ranked last week"
const NOT_RANKED: &str = "-";

/// Structural mismatch in a row that is otherwise present
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("row {row}: missing cell {cell} ({field})")]
    MissingCell {
        row: usize,
        cell: usize,
        field: &'static str,
    },

    #[error("row {row}: missing <{element}> in title cell")]
    MissingElement { row: usize, element: &'static str },

    #[error("row {row}: {field} is empty")]
    EmptyField { row: usize, field: &'static str },

    #[error("row {row}: {field} is not a number: {text:?}")]
    NotNumeric {
        row: usize,
        field: &'static str,
        text: String,
    },
}

struct Selectors {
    row: Selector,
    cell: Selector,
    title: Selector,
    artist: Selector,
}

fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| Selectors {
        row: Selector::parse(ROW_SELECTOR).expect("static row CSS selector is valid"),
        cell: Selector::parse("li").expect("static 'li' CSS selector is valid"),
        title: Selector::parse("h3").expect("static 'h3' CSS selector is valid"),
        artist: Selector::parse("span").expect("static 'span' CSS selector is valid"),
    })
}

/// Parse one chart page into entries ordered as they appear
pub fn parse(markup: &str) -> Result<Vec<ChartEntry>, ParseError> {
    let document = Html::parse_document(markup);
    let selectors = selectors();

    document
        .select(&selectors.row)
        .enumerate()
        .map(|(row, container)| parse_row(row, container, selectors))
        .collect()
}

fn parse_row(
    row: usize,
    container: ElementRef<'_>,
    selectors: &Selectors,
) -> Result<ChartEntry, ParseError> {
    let cells: Vec<ElementRef<'_>> = container.select(&selectors.cell).collect();
    let cell = |index: usize, field: &'static str| {
        cells.get(index).copied().ok_or(ParseError::MissingCell {
            row,
            cell: index,
            field,
        })
    };

    let mut position_text = text_of(cell(POSITION_CELL, "position")?);
    for marker in POSITION_MARKERS {
        position_text = position_text.replace(marker, "");
    }
    let position = parse_number(row, "position", &position_text)?;
    if position == 0 {
        return Err(ParseError::NotNumeric {
            row,
            field: "position",
            text: position_text,
        });
    }

    let title_cell = cell(TITLE_CELL, "title")?;
    let title = first_text(row, title_cell, &selectors.title, "h3", "title")?;
    let artist = first_text(row, title_cell, &selectors.artist, "span", "artist")?;

    let last_week_text = text_of(cell(LAST_WEEK_CELL, "last week position")?);
    let last_week_position = if last_week_text == NOT_RANKED {
        0
    } else {
        parse_number(row, "last week position", &last_week_text)?
    };

    let peak_position = parse_number(row, "peak position", &text_of(cell(PEAK_CELL, "peak position")?))?;
    let weeks_on_chart = parse_number(row, "weeks on chart", &text_of(cell(WEEKS_CELL, "weeks on chart")?))?;

    Ok(ChartEntry {
        position,
        title,
        artist,
        last_week_position,
        peak_position,
        weeks_on_chart,
    })
}

fn first_text(
    row: usize,
    cell: ElementRef<'_>,
    selector: &Selector,
    element: &'static str,
    field: &'static str,
) -> Result<String, ParseError> {
    let node = cell
        .select(selector)
        .next()
        .ok_or(ParseError::MissingElement { row, element })?;
    let text = text_of(node);
    if text.is_empty() {
        return Err(ParseError::EmptyField { row, field });
    }
    Ok(text)
}

fn parse_number(row: usize, field: &'static str, text: &str) -> Result<u32, ParseError> {
    let trimmed = text.trim();
    trimmed.parse().map_err(|_| ParseError::NotNumeric {
        row,
        field,
        text: trimmed.to_string(),
    })
}

/// Element text with tabs and line breaks removed, then trimmed
fn text_of(element: ElementRef<'_>) -> String {
    let raw: String = element.text().collect();
    strip_layout_whitespace(&raw)
}

pub(crate) fn strip_layout_whitespace(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '\t' | '\n' | '\r'))
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Markup builders mirroring the published row layout

    /// One row container; `cells` 5..=12 are filler
    pub fn row(position: &str, title: &str, artist: &str, last: &str, peak: &str, weeks: &str) -> String {
        let mut cells = Vec::with_capacity(16);
        cells.push(format!("<li>\n\t\t{}\n\t</li>", position));
        for _ in 1..4 {
            cells.push("<li>\n\t</li>".to_string());
        }
        cells.push(format!(
            "<li><h3 id=\"title-of-a-story\">\n\t\t{}\n\t</h3><span>\n\t\t{}\n\t</span></li>",
            title, artist
        ));
        for _ in 5..13 {
            cells.push("<li>\n\t\tfiller\n\t</li>".to_string());
        }
        cells.push(format!("<li>\n\t{}\n</li>", last));
        cells.push(format!("<li>\n\t{}\n</li>", peak));
        cells.push(format!("<li>\n\t{}\n</li>", weeks));

        format!(
            "<div class=\"o-chart-results-list-row-container\"><ul>{}</ul></div>",
            cells.join("")
        )
    }

    pub fn page(rows: &[String]) -> String {
        format!(
            "<!DOCTYPE html><html><head><title>Chart</title></head><body><div class=\"chart\">{}</div></body></html>",
            rows.join("\n")
        )
    }

    /// A well-formed page with `count` sequential rows
    pub fn chart_page(count: u32) -> String {
        let rows: Vec<String> = (1..=count)
            .map(|p| {
                row(
                    &p.to_string(),
                    &format!("Song {}", p),
                    &format!("Artist {}", p),
                    "-",
                    &p.to_string(),
                    "1",
                )
            })
            .collect();
        page(&rows)
    }
}
