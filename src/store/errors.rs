//! Store error types
//!
//! Store errors propagate unmodified through the executor; the executor only
//! guarantees that already-opened scans are released on the way out.
//!
//! Error codes:
//! - AERO_SCAN_OPEN_FAILED (ERROR)
//! - AERO_SCAN_FAILED (ERROR)
//! - AERO_SCAN_CLOSED (ERROR)
//! - AERO_STAGE_REJECTED (ERROR)
//! - AERO_UNKNOWN_TABLE (ERROR)
//! - AERO_CODEC_FAILED (ERROR)
//! - AERO_DATA_CORRUPTION (FATAL)

use std::fmt;

/// Severity levels for store errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation failed but the store is healthy
    Error,
    /// The current iteration cannot continue
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Store-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// Scan could not be opened
    AeroScanOpenFailed,
    /// Scan failed while producing entries
    AeroScanFailed,
    /// Handle used after release
    AeroScanClosed,
    /// Stage configuration rejected by the store
    AeroStageRejected,
    /// Table does not exist
    AeroUnknownTable,
    /// Record could not be encoded
    AeroCodecFailed,
    /// Value failed to decode (FATAL)
    AeroDataCorruption,
}

impl StoreErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            StoreErrorCode::AeroScanOpenFailed => "AERO_SCAN_OPEN_FAILED",
            StoreErrorCode::AeroScanFailed => "AERO_SCAN_FAILED",
            StoreErrorCode::AeroScanClosed => "AERO_SCAN_CLOSED",
            StoreErrorCode::AeroStageRejected => "AERO_STAGE_REJECTED",
            StoreErrorCode::AeroUnknownTable => "AERO_UNKNOWN_TABLE",
            StoreErrorCode::AeroCodecFailed => "AERO_CODEC_FAILED",
            StoreErrorCode::AeroDataCorruption => "AERO_DATA_CORRUPTION",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            StoreErrorCode::AeroDataCorruption => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for StoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Store error type with full context
#[derive(Debug, Clone)]
pub struct StoreError {
    code: StoreErrorCode,
    message: String,
    table: Option<String>,
}

impl StoreError {
    fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            table: None,
        }
    }

    /// Create a scan open failure
    pub fn open_failed(table: impl Into<String>, reason: impl Into<String>) -> Self {
        let t = table.into();
        Self {
            code: StoreErrorCode::AeroScanOpenFailed,
            message: format!("Failed to open scan on '{}': {}", t, reason.into()),
            table: Some(t),
        }
    }

    /// Create a scan failure
    pub fn scan_failed(reason: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::AeroScanFailed, reason)
    }

    /// Create a use-after-release error
    pub fn scan_closed() -> Self {
        Self::new(StoreErrorCode::AeroScanClosed, "Scan handle already released")
    }

    /// Create a stage rejection
    pub fn stage_rejected(stage: &str, reason: impl Into<String>) -> Self {
        Self::new(
            StoreErrorCode::AeroStageRejected,
            format!("Stage '{}' rejected: {}", stage, reason.into()),
        )
    }

    /// Create an unknown table error
    pub fn unknown_table(table: impl Into<String>) -> Self {
        let t = table.into();
        Self {
            code: StoreErrorCode::AeroUnknownTable,
            message: format!("Table '{}' does not exist", t),
            table: Some(t),
        }
    }

    /// Create an encode failure
    pub fn codec_failed(reason: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::AeroCodecFailed, reason)
    }

    /// Create a data corruption error (FATAL)
    pub fn data_corruption(reason: impl Into<String>) -> Self {
        Self::new(
            StoreErrorCode::AeroDataCorruption,
            format!("Data corruption: {}", reason.into()),
        )
    }

    /// Returns the error code
    pub fn code(&self) -> StoreErrorCode {
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

    /// Returns the table name if applicable
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Returns whether this is a fatal error
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for StoreError {
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

impl std::error::Error for StoreError {}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corruption_is_fatal() {
        let err = StoreError::data_corruption("checksum mismatch");
        assert!(err.is_fatal());
        assert_eq!(err.code().severity(), Severity::Fatal);
    }

    #[test]
    fn test_open_failed_not_fatal() {
        let err = StoreError::open_failed("records", "injected");
        assert!(!err.is_fatal());
        assert_eq!(err.table(), Some("records"));
    }

    #[test]
    fn test_error_display() {
        let err = StoreError::scan_closed();
        let display = format!("{}", err);
        assert!(display.contains("AERO_SCAN_CLOSED"));
        assert!(display.contains("ERROR"));
    }
}
