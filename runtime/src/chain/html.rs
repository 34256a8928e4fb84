//! Fallback extraction from a statically rendered straddle table.
//!
//! Column classification is positional: the first half of the header cells
//! are call-side, the middle cell is the strike, the rest are put-side. This
//! matches the layout of the source page and is deliberately not inferred
//! from header text.

use super::coerce::parse_number;
use super::{sort_rows, OptionChain, Side, StrikeRow, STRIKE_COLUMN};
use crate::error::ScrapeError;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Identifies the section that contains the options table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLocator {
    /// Element name of the section, e.g. `section`.
    pub element: String,
    /// Attribute that identifies it, e.g. `data-testid`.
    pub attribute: String,
    pub value: String,
}

impl Default for TableLocator {
    fn default() -> Self {
        Self {
            element: "section".to_string(),
            attribute: "data-testid".to_string(),
            value: "options-straddle-table".to_string(),
        }
    }
}

impl TableLocator {
    fn selector(&self) -> Result<Selector, ScrapeError> {
        let css = format!(
            "{}[{}=\"{}\"]",
            self.element,
            self.attribute,
            self.value.replace('"', "\\\"")
        );
        Selector::parse(&css)
            .map_err(|e| ScrapeError::StructuralMismatch(format!("invalid locator {css}: {e:?}")))
    }
}

fn sel(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

/// Text of an element with each text node trimmed and empty nodes dropped.
fn cell_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Prefix header labels by position: call side, strike, put side.
fn classify_headers(raw: &[String]) -> (usize, Vec<String>) {
    let strike_idx = raw.len() / 2;
    let columns = raw
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if i < strike_idx {
                format!("{} {h}", Side::Call.label())
            } else if i == strike_idx {
                STRIKE_COLUMN.to_string()
            } else {
                format!("{} {h}", Side::Put.label())
            }
        })
        .collect();
    (strike_idx, columns)
}

/// Extract the side-by-side table located by `locator` from rendered markup.
pub fn extract_table(html: &str, locator: &TableLocator) -> Result<OptionChain, ScrapeError> {
    let document = Html::parse_document(html);
    let section_sel = locator.selector()?;

    let section = document.select(&section_sel).next().ok_or_else(|| {
        ScrapeError::StructuralMismatch(format!(
            "section {}=\"{}\" not found",
            locator.attribute, locator.value
        ))
    })?;

    let table = section
        .select(&sel("table"))
        .next()
        .ok_or_else(|| ScrapeError::StructuralMismatch("no table found".into()))?;

    let thead = table
        .select(&sel("thead"))
        .next()
        .ok_or_else(|| ScrapeError::StructuralMismatch("no table header found".into()))?;
    let raw_headers: Vec<String> = thead.select(&sel("th")).map(cell_text).collect();
    if raw_headers.is_empty() {
        return Err(ScrapeError::StructuralMismatch("no table header found".into()));
    }
    let (strike_idx, columns) = classify_headers(&raw_headers);

    let tbody = table
        .select(&sel("tbody"))
        .next()
        .ok_or_else(|| ScrapeError::StructuralMismatch("no table body found".into()))?;

    let td = sel("td");
    let mut rows = Vec::new();
    for tr in tbody.select(&sel("tr")) {
        let mut cells: Vec<String> = tr.select(&td).map(cell_text).collect();
        if cells.is_empty() {
            continue;
        }
        if cells.len() > columns.len() {
            debug!(cells = cells.len(), columns = columns.len(), "extra cells truncated");
        }
        cells.resize(columns.len(), String::new());

        let put = cells.split_off(strike_idx + 1);
        let strike = cells.pop().unwrap_or_default();
        rows.push(StrikeRow {
            strike_value: parse_number(&strike).unwrap_or(0.0),
            strike,
            call: cells,
            put,
        });
    }

    if rows.is_empty() {
        return Err(ScrapeError::StructuralMismatch("no data rows found".into()));
    }
    sort_rows(&mut rows);

    debug!(rows = rows.len(), columns = columns.len(), "extracted straddle table");
    Ok(OptionChain { columns, rows })
}
