//! CLI argument definitions using clap
//!
//! Commands:
//! - aerogeo explain --config <path> [--query <path>]
//! - aerogeo query --config <path> --data <path> [--query <path>]
//!
//! When `--query` is omitted the query JSON is read from stdin.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// aerogeo - spatio-temporal secondary-index query planner
#[derive(Parser, Debug)]
#[command(name = "aerogeo")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Plan a query and print the explain output
    Explain {
        /// Path to planner configuration file
        #[arg(long, default_value = "./aerogeo.json")]
        config: PathBuf,

        /// Path to query JSON (stdin if omitted)
        #[arg(long)]
        query: Option<PathBuf>,
    },

    /// Load records into an in-memory index, run one query and exit
    Query {
        /// Path to planner configuration file
        #[arg(long, default_value = "./aerogeo.json")]
        config: PathBuf,

        /// Records, one JSON object per line
        #[arg(long)]
        data: PathBuf,

        /// Path to query JSON (stdin if omitted)
        #[arg(long)]
        query: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_explain() {
        let cli = Cli::parse_from(["aerogeo", "explain", "--query", "q.json"]);
        match cli.command {
            Command::Explain { config, query } => {
                assert_eq!(config, PathBuf::from("./aerogeo.json"));
                assert_eq!(query, Some(PathBuf::from("q.json")));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_query_requires_data() {
        assert!(Cli::try_parse_from(["aerogeo", "query"]).is_err());
    }
}
