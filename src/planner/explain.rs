//! Explain plan output
//!
//! Produces deterministic, human-readable explain output for an accepted
//! plan or a rejection.

use std::fmt;

use super::errors::PlannerError;
use super::planner::{QueryPlan, QueryStrategy};
use crate::keys::{ColumnFamilyPlan, KeyRange, KeyRanges};
use crate::stages::IteratorStage;

/// One scan as shown in explain output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplainScan {
    pub table: String,
    pub ranges: Vec<String>,
    pub families: Option<Vec<String>>,
    /// `priority name [k=v, ...]`
    pub stages: Vec<String>,
}

/// Explain plan output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplainPlan {
    /// Whether planning succeeded
    pub accepted: bool,
    pub type_name: Option<String>,
    pub strategy: Option<String>,
    /// Key planning filter shape (spatio-temporal only)
    pub filter: Option<String>,
    pub row_regex: Option<String>,
    pub scans: Vec<ExplainScan>,
    /// Rejection reason (if rejected)
    pub rejection_reason: Option<String>,
    /// Rejection error code (if rejected)
    pub rejection_code: Option<String>,
}

impl ExplainPlan {
    /// Creates an explain plan from a successful query plan
    pub fn from_plan(plan: &QueryPlan) -> Self {
        let mut explain = Self {
            accepted: true,
            type_name: Some(plan.type_name.clone()),
            strategy: Some(plan.strategy.kind().as_str().to_string()),
            filter: None,
            row_regex: None,
            scans: Vec::new(),
            rejection_reason: None,
            rejection_code: None,
        };

        match &plan.strategy {
            QueryStrategy::SpatioTemporal(st) => {
                explain.filter = Some(st.filter.name().to_string());
                explain.row_regex = st.keys.row_regex.clone();
                explain.scans.push(ExplainScan {
                    table: st.table.clone(),
                    ranges: describe_ranges(&st.keys.ranges),
                    families: describe_families(&st.families),
                    stages: describe_stages(&st.stages),
                });
            }
            QueryStrategy::AttributeIndex(attr) => {
                explain.scans.push(ExplainScan {
                    table: attr.index_table.clone(),
                    ranges: vec![describe_range(&attr.range)],
                    families: None,
                    stages: describe_stages(&attr.index_stages),
                });
                explain.scans.push(ExplainScan {
                    table: attr.record_table.clone(),
                    ranges: vec!["<distinct phase-1 pointers>".to_string()],
                    families: None,
                    stages: describe_stages(&attr.record_stages),
                });
            }
            QueryStrategy::Empty => {}
        }
        explain
    }

    /// Creates an explain plan from a planning error
    pub fn from_error(err: &PlannerError) -> Self {
        Self {
            accepted: false,
            type_name: None,
            strategy: None,
            filter: None,
            row_regex: None,
            scans: Vec::new(),
            rejection_reason: Some(err.message().to_string()),
            rejection_code: Some(err.code().code().to_string()),
        }
    }
}

fn printable(bytes: &[u8]) -> String {
    bytes
        .iter()
        .flat_map(|b| std::ascii::escape_default(*b))
        .map(char::from)
        .collect()
}

fn describe_range(range: &KeyRange) -> String {
    match &range.end {
        Some(end) => format!("[{}, {})", printable(&range.start), printable(end)),
        None => format!("[{}, +inf)", printable(&range.start)),
    }
}

fn describe_ranges(ranges: &KeyRanges) -> Vec<String> {
    match ranges {
        KeyRanges::Unconstrained => vec!["<all rows>".to_string()],
        KeyRanges::Ranges(ranges) => ranges.iter().map(describe_range).collect(),
    }
}

fn describe_families(families: &ColumnFamilyPlan) -> Option<Vec<String>> {
    match families {
        ColumnFamilyPlan::Unconstrained => None,
        ColumnFamilyPlan::Families(set) => Some(set.iter().map(|f| printable(f)).collect()),
    }
}

fn describe_stages(stages: &[IteratorStage]) -> Vec<String> {
    stages
        .iter()
        .map(|stage| {
            let options: Vec<String> = stage
                .options
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            format!("{} {} [{}]", stage.priority, stage.name, options.join(", "))
        })
        .collect()
}

impl fmt::Display for ExplainPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== EXPLAIN PLAN ===")?;

        if self.accepted {
            writeln!(f, "Status: ACCEPTED")?;
            if let Some(type_name) = &self.type_name {
                writeln!(f, "Type: {}", type_name)?;
            }
            if let Some(strategy) = &self.strategy {
                writeln!(f, "Strategy: {}", strategy)?;
            }
            if let Some(filter) = &self.filter {
                writeln!(f, "Filter: {}", filter)?;
            }
            if let Some(regex) = &self.row_regex {
                writeln!(f, "Row Regex: {}", regex)?;
            }
            for (i, scan) in self.scans.iter().enumerate() {
                writeln!(f, "Scan {}: {}", i + 1, scan.table)?;
                writeln!(f, "  Ranges:")?;
                for range in &scan.ranges {
                    writeln!(f, "    - {}", range)?;
                }
                if let Some(families) = &scan.families {
                    writeln!(f, "  Column Families: {}", families.join(", "))?;
                }
                if !scan.stages.is_empty() {
                    writeln!(f, "  Stages:")?;
                    for stage in &scan.stages {
                        writeln!(f, "    - {}", stage)?;
                    }
                }
            }
        } else {
            writeln!(f, "Status: REJECTED")?;
            if let Some(code) = &self.rejection_code {
                writeln!(f, "Error Code: {}", code)?;
            }
            if let Some(reason) = &self.rejection_reason {
                writeln!(f, "Reason: {}", reason)?;
            }
        }

        Ok(())
    }
}
