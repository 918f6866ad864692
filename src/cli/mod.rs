//! CLI module for aerogeo
//!
//! Provides command-line interface for:
//! - explain: plan one query and print the explain output
//! - query: run one query over records loaded into an in-memory index

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{explain, explain_query, query_command, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{parse_records, read_query, read_records, write_record};
