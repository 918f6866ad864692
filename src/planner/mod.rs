//! Query planner subsystem
//!
//! Turns a `Query` into an immutable `QueryPlan`: a strategy, the key ranges
//! and column families to scan, and the ordered push-down stage stack.
//!
//! # Design Principles
//!
//! - Deterministic: same query and configuration give the same plan
//! - Fail fast: malformed queries are rejected before any scan opens
//! - Coarse then exact: ranges eliminate most rows, stages refine exactly
//!
//! # Strategy Selection
//!
//! 1. Geometry wholly outside the index domain: empty plan
//! 2. Single equality or prefix test on an indexed attribute, no density
//!    hint: two-phase attribute lookup
//! 3. Everything else: direct spatio-temporal scan

mod ast;
mod config;
mod errors;
mod explain;
mod planner;

pub use ast::{CompareOp, DensityHint, Expr, Interval, Predicate, Query, QueryHints};
pub use config::{DomainConfig, PlannerConfig, SchemaConfig, TableConfig};
pub use errors::{PlannerError, PlannerErrorCode, PlannerResult, Severity};
pub use explain::{ExplainPlan, ExplainScan};
pub use planner::{
    AttributePlan, QueryPlan, QueryPlanner, QueryStrategy, SpatioTemporalPlan, StrategyKind,
};
