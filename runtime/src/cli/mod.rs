//! CLI subcommand implementations for the chainscrape binary.

pub mod doctor;
pub mod parse_cmd;
pub mod scrape_cmd;
pub mod serve_cmd;

use crate::chain::OptionChain;
use crate::export::{to_csv_string, to_json_string};
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

/// Rendering used for command output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

/// Render `chain` and write it to `output`, or stdout when absent.
pub fn emit(
    chain: &OptionChain,
    symbol: &str,
    date: &str,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<()> {
    let text = match format {
        OutputFormat::Csv => to_csv_string(chain),
        OutputFormat::Json => to_json_string(symbol, date, chain)? + "\n",
    };
    match output {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::html::{extract_table, TableLocator};

    const PAGE: &str = r#"<section data-testid="options-straddle-table"><table>
        <thead><tr><th>Last</th><th>Chg</th><th>Bid</th><th>Ask</th><th>Vol</th>
                   <th>Strike</th>
                   <th>Last</th><th>Chg</th><th>Bid</th><th>Ask</th><th>Vol</th></tr></thead>
        <tbody><tr><td>5.20</td><td>+0.1</td><td>5.1</td><td>5.3</td><td>10</td>
                   <td>150</td>
                   <td>4.80</td><td>-0.2</td><td>4.7</td><td>4.9</td><td>12</td></tr></tbody>
    </table></section>"#;

    #[test]
    fn test_emit_writes_file() {
        let chain = extract_table(PAGE, &TableLocator::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        emit(&chain, "AAPL", "2026-01-17", OutputFormat::Json, Some(&path)).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["count"], 1);
        assert_eq!(value["data"][0]["Strike"], "150");
    }
}
