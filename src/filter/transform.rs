//! Projection/transform descriptors
//!
//! A transform is an expression `target[=source];...` paired with a target
//! schema `name[:Type],...`. The pair is only meaningful together and every
//! target must be declared by the schema (and vice versa).

use std::collections::BTreeSet;

use crate::planner::{PlannerError, PlannerResult};
use crate::record::Record;

/// One `target=source` projection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub target: String,
    pub source: String,
}

/// Parsed transform pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transform {
    expression: String,
    schema: String,
    definitions: Vec<Definition>,
}

impl Transform {
    /// Parses and cross-checks an expression against its target schema
    pub fn parse(expression: &str, schema: &str) -> PlannerResult<Self> {
        let mut definitions = Vec::new();
        for item in expression.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (target, source) = match item.split_once('=') {
                Some((target, source)) => (target.trim(), source.trim()),
                None => (item, item),
            };
            if target.is_empty() || source.is_empty() {
                return Err(PlannerError::transform_invalid(format!(
                    "Malformed transform definition '{}'",
                    item
                )));
            }
            definitions.push(Definition {
                target: target.to_string(),
                source: source.to_string(),
            });
        }
        if definitions.is_empty() {
            return Err(PlannerError::transform_invalid("Transform expression is empty"));
        }

        let declared: BTreeSet<&str> = schema
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|field| {
                let name = field.split(':').next().unwrap_or(field).trim();
                name.trim_start_matches('*')
            })
            .collect();
        let targets: BTreeSet<&str> = definitions.iter().map(|d| d.target.as_str()).collect();

        if targets.len() != definitions.len() {
            return Err(PlannerError::transform_invalid(
                "Transform defines the same target twice",
            ));
        }
        if declared != targets {
            return Err(PlannerError::transform_invalid(format!(
                "Transform targets {:?} do not match schema attributes {:?}",
                targets, declared
            )));
        }

        Ok(Self {
            expression: expression.to_string(),
            schema: schema.to_string(),
            definitions,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn definitions(&self) -> &[Definition] {
        &self.definitions
    }

    /// Source attributes the transform reads
    pub fn sources(&self) -> BTreeSet<&str> {
        self.definitions.iter().map(|d| d.source.as_str()).collect()
    }

    /// Projects a record onto the target schema.
    ///
    /// Geometry and timestamp are typed fields and always carried.
    pub fn apply(&self, record: &Record) -> Record {
        let attributes = self
            .definitions
            .iter()
            .filter_map(|d| {
                record
                    .attributes
                    .get(&d.source)
                    .map(|v| (d.target.clone(), v.clone()))
            })
            .collect();
        Record {
            id: record.id.clone(),
            geometry: record.geometry,
            dtg: record.dtg,
            attributes,
        }
    }
}
