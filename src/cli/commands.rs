//! CLI command implementations
//!
//! Commands are one-shot: load configuration, do one thing, exit.

use std::path::Path;

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{read_query, read_records, write_record};
use crate::executor::QueryExecutor;
use crate::observability::{Event, Logger, MetricsRegistry};
use crate::planner::{ExplainPlan, PlannerConfig, Query, QueryPlanner};
use crate::record::codec_for_name;
use crate::store::{IndexWriter, IngestCounters, MemoryStore};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Explain { config, query } => {
            let output = explain(&config, query.as_deref())?;
            print!("{}", output);
            Ok(())
        }
        Command::Query {
            config,
            data,
            query,
        } => query_command(&config, &data, query.as_deref()),
    }
}

fn load_planner(config_path: &Path) -> CliResult<QueryPlanner> {
    let config = PlannerConfig::load(config_path)
        .map_err(|e| CliError::config_error(e.to_string()))?;
    Ok(QueryPlanner::new(config)?)
}

/// Plans a query and renders the explain output.
///
/// A rejected query is not a command failure: the rejection is rendered.
pub fn explain(config_path: &Path, query_path: Option<&Path>) -> CliResult<String> {
    let planner = load_planner(config_path)?;
    let query = read_query(query_path)?;
    Ok(explain_query(&planner, &query))
}

/// Renders the explain output for one query
pub fn explain_query(planner: &QueryPlanner, query: &Query) -> String {
    Logger::event(Event::ExplainBegin, &[("type_name", &query.type_name)]);
    let explain = match planner.plan(query) {
        Ok(plan) => ExplainPlan::from_plan(&plan),
        Err(e) => ExplainPlan::from_error(&e),
    };
    let status = if explain.accepted { "ACCEPTED" } else { "REJECTED" };
    Logger::event(Event::ExplainComplete, &[("status", status)]);
    explain.to_string()
}

/// Loads records into an in-memory index, runs one query, prints matches
pub fn query_command(config_path: &Path, data_path: &Path, query_path: Option<&Path>) -> CliResult<()> {
    let planner = load_planner(config_path)?;
    let records = read_records(data_path)?;
    let query = read_query(query_path)?;

    let store = MemoryStore::new();
    let writer = IndexWriter::new(&store, &planner)?;
    writer.create_tables();
    let mut counters = IngestCounters::default();
    writer.append_all(&records, &mut counters)?;

    let codec = codec_for_name(&planner.config().codec)
        .ok_or_else(|| CliError::config_error("Unknown codec"))?;
    let metrics = MetricsRegistry::new();
    let executor = QueryExecutor::new(&store, &metrics);
    let mut results = executor.query(&planner, &query)?;
    let matches = results.decode_remaining(codec)?;
    results.close()?;

    for record in &matches {
        write_record(record)?;
    }
    let written = counters.written.to_string();
    let skipped = counters.skipped.to_string();
    let returned = matches.len().to_string();
    Logger::info(
        "QUERY_SUMMARY",
        &[
            ("written", &written),
            ("skipped", &skipped),
            ("returned", &returned),
            ("metrics", &metrics.to_json()),
        ],
    );
    Ok(())
}
