//! CSV and JSON renderings of a chain.

use crate::chain::{OptionChain, RowRecord};
use serde::Serialize;
use std::io::{self, Write};

/// Response envelope shared by the CLI and the HTTP API.
#[derive(Serialize)]
pub struct ChainEnvelope<'a> {
    pub success: bool,
    pub symbol: &'a str,
    pub date: &'a str,
    pub count: usize,
    pub data: Vec<RowRecord<'a>>,
}

impl<'a> ChainEnvelope<'a> {
    pub fn new(symbol: &'a str, date: &'a str, chain: &'a OptionChain) -> Self {
        Self {
            success: true,
            symbol,
            date,
            count: chain.len(),
            data: chain.records(),
        }
    }
}

/// `options_{symbol}_{date}.csv`, with any `$` index prefix dropped.
pub fn csv_filename(symbol: &str, date: &str) -> String {
    format!("options_{}_{}.csv", symbol.replace('$', ""), date)
}

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn write_row<'a, W: Write>(w: &mut W, cells: impl IntoIterator<Item = &'a str>) -> io::Result<()> {
    let mut first = true;
    for cell in cells {
        if !first {
            w.write_all(b",")?;
        }
        first = false;
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            w.write_all(cell.as_bytes())?;
        }
    }
    writeln!(w)
}

/// Write a header row then one line per strike.
pub fn write_csv<W: Write>(mut w: W, chain: &OptionChain) -> io::Result<()> {
    write_row(&mut w, chain.columns.iter().map(String::as_str))?;
    for row in &chain.rows {
        write_row(&mut w, row.cells())?;
    }
    w.flush()
}

pub fn to_csv_string(chain: &OptionChain) -> String {
    let mut buf = Vec::new();
    // Writing to a Vec cannot fail.
    let _ = write_csv(&mut buf, chain);
    String::from_utf8_lossy(&buf).into_owned()
}

pub fn to_json_string(symbol: &str, date: &str, chain: &OptionChain) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&ChainEnvelope::new(symbol, date, chain))
}
