//! Query execution errors
//!
//! Planning errors and store errors pass through unmodified.

use thiserror::Error;

use crate::planner::PlannerError;
use crate::store::StoreError;

/// Result type for query execution
pub type QueryResult<T> = Result<T, QueryError>;

/// Query execution errors
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    /// Rejected before any scan opened
    #[error("{0}")]
    Planner(#[from] PlannerError),

    /// Raised by the store while opening, reading or closing a scan
    #[error("{0}")]
    Store(#[from] StoreError),
}

impl QueryError {
    /// Stable `AERO_*` code of the underlying error
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::Planner(e) => e.code().code(),
            QueryError::Store(e) => e.code().code(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            QueryError::Planner(e) => e.message(),
            QueryError::Store(e) => e.message(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, QueryError::Store(e) if e.is_fatal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_pass_through() {
        let err: QueryError = PlannerError::unknown_type("roads").into();
        assert_eq!(err.code(), "AERO_QUERY_UNKNOWN_TYPE");
        assert!(!err.is_fatal());

        let err: QueryError = StoreError::data_corruption("bad crc").into();
        assert_eq!(err.code(), "AERO_DATA_CORRUPTION");
        assert!(err.is_fatal());
        assert!(err.to_string().contains("AERO_DATA_CORRUPTION"));
    }
}
