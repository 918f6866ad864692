//! JSON I/O handling for CLI
//!
//! - Query input: one JSON object, from a file or stdin
//! - Record input: one JSON object per line; blank lines ignored
//! - Record output: one JSON object per line on stdout

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use super::errors::{CliError, CliResult};
use crate::planner::Query;
use crate::record::Record;

/// Reads a query from `path`, or from stdin when `None`
pub fn read_query(path: Option<&Path>) -> CliResult<Query> {
    let text = match path {
        Some(path) => fs::read_to_string(path).map_err(|e| {
            CliError::io_error(format!("Failed to read query {}: {}", path.display(), e))
        })?,
        None => {
            let mut text = String::new();
            io::stdin().lock().read_to_string(&mut text)?;
            text
        }
    };
    if text.trim().is_empty() {
        return Err(CliError::input_error("Empty query input"));
    }
    Ok(serde_json::from_str(&text)?)
}

/// Parses newline-delimited records
pub fn parse_records(text: &str) -> CliResult<Vec<Record>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line)
                .map_err(|e| CliError::input_error(format!("Record on line {}: {}", n + 1, e)))
        })
        .collect()
}

/// Reads newline-delimited records from a file
pub fn read_records(path: &Path) -> CliResult<Vec<Record>> {
    let text = fs::read_to_string(path).map_err(|e| {
        CliError::io_error(format!("Failed to read records {}: {}", path.display(), e))
    })?;
    parse_records(&text)
}

/// Writes one record as a JSON line to stdout
pub fn write_record(record: &Record) -> CliResult<()> {
    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, record)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}
