//! Planner error types
//!
//! Every planner error is raised before any scan is opened, so no cleanup
//! is ever required when one of these is returned.
//!
//! Error codes:
//! - AERO_QUERY_INVALID (REJECT)
//! - AERO_QUERY_UNSUPPORTED_OPERANDS (REJECT)
//! - AERO_QUERY_UNKNOWN_PROPERTY (REJECT)
//! - AERO_QUERY_UNKNOWN_TYPE (REJECT)
//! - AERO_HINTS_INCOMPLETE (REJECT)
//! - AERO_TRANSFORM_INCOMPLETE (REJECT)
//! - AERO_TRANSFORM_INVALID (REJECT)
//! - AERO_STAGE_CONFLICT (REJECT)
//! - AERO_CONFIG_INVALID (REJECT)

use std::fmt;

/// Severity levels for planner errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Client request rejected
    Reject,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
        }
    }
}

/// Planner-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerErrorCode {
    /// Malformed predicate or query structure
    AeroQueryInvalid,
    /// Operand combination the classifier cannot interpret
    AeroQueryUnsupportedOperands,
    /// Predicate references a property the schema does not declare
    AeroQueryUnknownProperty,
    /// Query names an output type this index does not serve
    AeroQueryUnknownType,
    /// Density hints supplied partially
    AeroHintsIncomplete,
    /// Transform expression without schema, or the reverse
    AeroTransformIncomplete,
    /// Transform expression and schema disagree
    AeroTransformInvalid,
    /// Two stages collide on name or exclusive priority slot
    AeroStageConflict,
    /// Planner configuration rejected
    AeroConfigInvalid,
}

impl PlannerErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            PlannerErrorCode::AeroQueryInvalid => "AERO_QUERY_INVALID",
            PlannerErrorCode::AeroQueryUnsupportedOperands => "AERO_QUERY_UNSUPPORTED_OPERANDS",
            PlannerErrorCode::AeroQueryUnknownProperty => "AERO_QUERY_UNKNOWN_PROPERTY",
            PlannerErrorCode::AeroQueryUnknownType => "AERO_QUERY_UNKNOWN_TYPE",
            PlannerErrorCode::AeroHintsIncomplete => "AERO_HINTS_INCOMPLETE",
            PlannerErrorCode::AeroTransformIncomplete => "AERO_TRANSFORM_INCOMPLETE",
            PlannerErrorCode::AeroTransformInvalid => "AERO_TRANSFORM_INVALID",
            PlannerErrorCode::AeroStageConflict => "AERO_STAGE_CONFLICT",
            PlannerErrorCode::AeroConfigInvalid => "AERO_CONFIG_INVALID",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        Severity::Reject
    }
}

impl fmt::Display for PlannerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Planner error type with full context
#[derive(Debug, Clone)]
pub struct PlannerError {
    /// Error code
    code: PlannerErrorCode,
    /// Human-readable message
    message: String,
    /// Property name if applicable
    property: Option<String>,
}

impl PlannerError {
    fn new(code: PlannerErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            property: None,
        }
    }

    /// Create a query invalid error
    pub fn query_invalid(reason: impl Into<String>) -> Self {
        Self::new(PlannerErrorCode::AeroQueryInvalid, reason)
    }

    /// Create an unsupported operand combination error
    pub fn unsupported_operands(reason: impl Into<String>) -> Self {
        Self::new(PlannerErrorCode::AeroQueryUnsupportedOperands, reason)
    }

    /// Create an unknown property error
    pub fn unknown_property(property: impl Into<String>) -> Self {
        let p = property.into();
        Self {
            code: PlannerErrorCode::AeroQueryUnknownProperty,
            message: format!("Property '{}' is not part of the index schema", p),
            property: Some(p),
        }
    }

    /// Create an unknown output type error
    pub fn unknown_type(type_name: impl Into<String>) -> Self {
        Self::new(
            PlannerErrorCode::AeroQueryUnknownType,
            format!("Type '{}' is not served by this index", type_name.into()),
        )
    }

    /// Create an incomplete density hints error
    pub fn hints_incomplete(reason: impl Into<String>) -> Self {
        Self::new(PlannerErrorCode::AeroHintsIncomplete, reason)
    }

    /// Create an incomplete transform pair error
    pub fn transform_incomplete() -> Self {
        Self::new(
            PlannerErrorCode::AeroTransformIncomplete,
            "Transform requires both an expression and a target schema",
        )
    }

    /// Create an invalid transform error
    pub fn transform_invalid(reason: impl Into<String>) -> Self {
        Self::new(PlannerErrorCode::AeroTransformInvalid, reason)
    }

    /// Create a stage conflict error
    pub fn stage_conflict(reason: impl Into<String>) -> Self {
        Self::new(PlannerErrorCode::AeroStageConflict, reason)
    }

    /// Create a configuration error
    pub fn config_invalid(reason: impl Into<String>) -> Self {
        Self::new(PlannerErrorCode::AeroConfigInvalid, reason)
    }

    /// Returns the error code
    pub fn code(&self) -> PlannerErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the property name if applicable
    pub fn property(&self) -> Option<&str> {
        self.property.as_deref()
    }
}

impl fmt::Display for PlannerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )
    }
}

impl std::error::Error for PlannerError {}

/// Result type for planner operations
pub type PlannerResult<T> = Result<T, PlannerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            PlannerErrorCode::AeroQueryInvalid.code(),
            "AERO_QUERY_INVALID"
        );
        assert_eq!(
            PlannerErrorCode::AeroTransformIncomplete.code(),
            "AERO_TRANSFORM_INCOMPLETE"
        );
        assert_eq!(
            PlannerErrorCode::AeroStageConflict.code(),
            "AERO_STAGE_CONFLICT"
        );
    }

    #[test]
    fn test_all_reject() {
        let err = PlannerError::hints_incomplete("bbox missing");
        assert_eq!(err.severity(), Severity::Reject);
    }

    #[test]
    fn test_error_display() {
        let err = PlannerError::unknown_property("height");
        let display = format!("{}", err);
        assert!(display.contains("AERO_QUERY_UNKNOWN_PROPERTY"));
        assert!(display.contains("height"));
        assert_eq!(err.property(), Some("height"));
    }
}
