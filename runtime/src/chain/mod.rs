//! Options-chain data model: legs, strike rows, and the side-by-side table.
//!
//! Both acquisition paths (captured API payloads and the static HTML table)
//! produce an [`OptionChain`]: a column header plus one [`StrikeRow`] per
//! distinct strike, ordered ascending by numeric strike.

pub mod coerce;
pub mod html;
pub mod normalize;

use coerce::{fmt_int, fmt_iv, fmt_price, format_decimal, parse_number, Volatility};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Per-leg column suffixes, in output order.
pub const LEG_COLUMNS: [&str; 7] = ["Latest", "Bid", "Ask", "Change", "Volume", "OI", "IV"];

/// Name of the strike column.
pub const STRIKE_COLUMN: &str = "Strike";

/// Column header of a chain built from captured API payloads.
pub fn api_columns() -> Vec<String> {
    let mut cols = Vec::with_capacity(LEG_COLUMNS.len() * 2 + 1);
    cols.extend(LEG_COLUMNS.iter().map(|c| format!("{} {c}", Side::Call.label())));
    cols.push(STRIKE_COLUMN.to_string());
    cols.extend(LEG_COLUMNS.iter().map(|c| format!("{} {c}", Side::Put.label())));
    cols
}

/// Which side of a strike a leg belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Side {
    Call,
    Put,
}

impl Side {
    /// Case-insensitive parse of an upstream `optionType`.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "call" | "c" => Some(Side::Call),
            "put" | "p" => Some(Side::Put),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Side::Call => "Call",
            Side::Put => "Put",
        }
    }
}

/// A strike as seen upstream: the original label plus its numeric value
/// when the label parses.
#[derive(Debug, Clone, PartialEq)]
pub struct Strike {
    pub label: String,
    pub value: Option<f64>,
}

impl Strike {
    pub fn parse(label: &str) -> Self {
        Self {
            label: label.trim().to_string(),
            value: parse_number(label),
        }
    }

    /// Value used for ordering. Unparseable strikes sort as zero.
    pub fn sort_value(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }

    /// `1,250.00` style when numeric and non-zero, otherwise the original label.
    pub fn display(&self) -> String {
        match self.value {
            Some(v) if v != 0.0 => format_decimal(v),
            _ => self.label.clone(),
        }
    }
}

/// One side (call or put) of one strike.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionLeg {
    pub strike: Strike,
    pub side: Side,
    pub last_price: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub price_change: String,
    pub volume: Option<i64>,
    pub open_interest: Option<i64>,
    pub implied_volatility: Option<Volatility>,
    pub trade_time: String,
}

impl OptionLeg {
    /// Display cells in [`LEG_COLUMNS`] order.
    pub fn cells(&self) -> Vec<String> {
        vec![
            fmt_price(self.last_price),
            fmt_price(self.bid),
            fmt_price(self.ask),
            self.price_change.clone(),
            fmt_int(self.volume),
            fmt_int(self.open_interest),
            fmt_iv(self.implied_volatility.as_ref()),
        ]
    }
}

/// Cells for a possibly-missing leg. A missing side is blank, never dropped.
pub fn leg_cells(leg: Option<&OptionLeg>) -> Vec<String> {
    match leg {
        Some(leg) => leg.cells(),
        None => vec![String::new(); LEG_COLUMNS.len()],
    }
}

/// One output row: a strike with its call-side and put-side cells.
#[derive(Debug, Clone, PartialEq)]
pub struct StrikeRow {
    pub strike: String,
    pub strike_value: f64,
    pub call: Vec<String>,
    pub put: Vec<String>,
}

impl StrikeRow {
    /// All cells in column order: call side, strike, put side.
    pub fn cells(&self) -> impl Iterator<Item = &str> {
        self.call
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.strike.as_str()))
            .chain(self.put.iter().map(String::as_str))
    }
}

/// A side-by-side options chain.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionChain {
    pub columns: Vec<String>,
    pub rows: Vec<StrikeRow>,
}

impl OptionChain {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as column-name → cell records, preserving column order when
    /// serialized.
    pub fn records(&self) -> Vec<RowRecord<'_>> {
        self.rows
            .iter()
            .map(|row| RowRecord { columns: &self.columns, row })
            .collect()
    }

    /// Look up a cell of `row` by column name.
    pub fn cell<'a>(&self, row: &'a StrikeRow, column: &str) -> Option<&'a str> {
        let idx = self.columns.iter().position(|c| c == column)?;
        row.cells().nth(idx)
    }
}

/// Serializes one row as an ordered JSON object keyed by column name.
pub struct RowRecord<'a> {
    columns: &'a [String],
    row: &'a StrikeRow,
}

impl Serialize for RowRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        let mut cells = self.row.cells();
        for column in self.columns {
            map.serialize_entry(column, cells.next().unwrap_or(""))?;
        }
        map.end()
    }
}

/// Stable ascending sort by numeric strike.
pub(crate) fn sort_rows(rows: &mut [StrikeRow]) {
    rows.sort_by(|a, b| a.strike_value.total_cmp(&b.strike_value));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_columns_layout() {
        let cols = api_columns();
        assert_eq!(cols.len(), 15);
        assert_eq!(cols[0], "Call Latest");
        assert_eq!(cols[5], "Call OI");
        assert_eq!(cols[7], "Strike");
        assert_eq!(cols[14], "Put IV");
    }

    #[test]
    fn test_side_parse() {
        assert_eq!(Side::parse("Call"), Some(Side::Call));
        assert_eq!(Side::parse("PUT"), Some(Side::Put));
        assert_eq!(Side::parse("straddle"), None);
    }

    #[test]
    fn test_strike_display() {
        assert_eq!(Strike::parse("150").display(), "150.00");
        assert_eq!(Strike::parse("1,250.5").display(), "1,250.50");
        assert_eq!(Strike::parse("n/a").display(), "n/a");
        assert_eq!(Strike::parse("n/a").sort_value(), 0.0);
        assert_eq!(Strike::parse("0").display(), "0");
    }

    #[test]
    fn test_missing_leg_is_blank() {
        let cells = leg_cells(None);
        assert_eq!(cells.len(), LEG_COLUMNS.len());
        assert!(cells.iter().all(String::is_empty));
    }

    #[test]
    fn test_record_serializes_in_column_order() {
        let chain = OptionChain {
            columns: vec!["Call Latest".into(), "Strike".into(), "Put Latest".into()],
            rows: vec![StrikeRow {
                strike: "100.00".into(),
                strike_value: 100.0,
                call: vec!["1.00".into()],
                put: vec!["2.00".into()],
            }],
        };
        let json = serde_json::to_string(&chain.records()).unwrap();
        assert_eq!(
            json,
            r#"[{"Call Latest":"1.00","Strike":"100.00","Put Latest":"2.00"}]"#
        );
        assert_eq!(chain.cell(&chain.rows[0], "Put Latest"), Some("2.00"));
    }
}
