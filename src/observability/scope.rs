//! ObservationScope: bracketed BEGIN / COMPLETE / FAILED logging
//!
//! A scope logs `{name}_BEGIN` on creation and exactly one closing event:
//! `{name}_COMPLETE`, `{name}_FAILED`, or `{name}_INCOMPLETE` when dropped
//! unresolved. Closing events carry `elapsed_ms`.

use std::time::Instant;

use super::logger::{Logger, Severity};

pub struct ObservationScope {
    name: String,
    fields: Vec<(String, String)>,
    started: Instant,
    resolved: bool,
}

impl ObservationScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_fields(name, &[])
    }

    pub fn with_fields(name: impl Into<String>, fields: &[(&str, &str)]) -> Self {
        let scope = Self {
            name: name.into(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            started: Instant::now(),
            resolved: false,
        };
        scope.emit(Severity::Info, "BEGIN", &[], false);
        scope
    }

    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    pub fn complete_with_fields(mut self, extra: &[(&str, &str)]) {
        self.resolved = true;
        self.emit(Severity::Info, "COMPLETE", extra, true);
    }

    /// Logs `{name}_FAILED` at ERROR
    pub fn fail(mut self, reason: &str) {
        self.resolved = true;
        self.emit(Severity::Error, "FAILED", &[("reason", reason)], true);
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }

    fn emit(&self, severity: Severity, suffix: &str, extra: &[(&str, &str)], timed: bool) {
        let event = format!("{}_{}", self.name, suffix);
        let elapsed = self.elapsed_ms().to_string();
        let mut fields: Vec<(&str, &str)> = self
            .fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        fields.extend_from_slice(extra);
        if timed {
            fields.push(("elapsed_ms", &elapsed));
        }
        Logger::log(severity, &event, &fields);
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        if !self.resolved {
            self.emit(
                Severity::Warn,
                "INCOMPLETE",
                &[("reason", "scope dropped without completion")],
                true,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_complete_resolves() {
        let scope = ObservationScope::with_fields("TEST", &[("query", "q1")]);
        assert!(!scope.is_resolved());
        scope.complete_with_fields(&[("strategy", "ATTRIBUTE_EQ")]);
    }

    #[test]
    fn test_scope_fail_and_drop() {
        ObservationScope::new("TEST").fail("boom");
        drop(ObservationScope::new("TEST"));
    }
}
