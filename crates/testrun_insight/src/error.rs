use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, InsightError>;

/// Hard failures of the engine or the CLI around it.
///
/// Data-quality problems in individual rows are never reported through this
/// type; they become [`crate::record::ValidationWarning`]s in the snapshot.
#[derive(Debug, Error)]
pub enum InsightError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("required path does not exist: {path}")]
    MissingPath { path: PathBuf },

    #[error("engine invariant violated in {operation}: {message}")]
    InvariantViolation {
        operation: &'static str,
        message: String,
    },
}

impl InsightError {
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidConfig { .. } | Self::InvalidArgument { .. } => 2,
            Self::InvariantViolation { .. } => 70,
            _ => 1,
        }
    }

    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invariant(operation: &'static str, message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            operation,
            message: message.into(),
        }
    }

    /// True for the fatal whole-snapshot class of errors.
    #[must_use]
    pub fn is_engine_failure(&self) -> bool {
        matches!(
            self,
            Self::InvariantViolation { .. } | Self::InvalidConfig { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::InsightError;

    #[test]
    fn missing_path_exits_with_generic_failure() {
        let error = InsightError::MissingPath {
            path: PathBuf::from("rows.json"),
        };
        assert_eq!(error.exit_code(), 1);
        assert_eq!(error.to_string(), "required path does not exist: rows.json");
    }

    #[test]
    fn config_and_argument_errors_exit_with_usage_code() {
        assert_eq!(InsightError::config("bad marker").exit_code(), 2);
        assert_eq!(InsightError::invalid("bad section").exit_code(), 2);
    }

    #[test]
    fn invariant_violation_is_engine_failure() {
        let error = InsightError::invariant("conflict.from_runs", "empty run list");
        assert_eq!(error.exit_code(), 70);
        assert!(error.is_engine_failure());
        assert_eq!(
            error.to_string(),
            "engine invariant violated in conflict.from_runs: empty run list"
        );
    }

    #[test]
    fn io_errors_are_not_engine_failures() {
        let error = InsightError::from(std::io::Error::other("disk"));
        assert_eq!(error.exit_code(), 1);
        assert!(!error.is_engine_failure());
    }
}
