//! Structured error handling and exit codes.

use serde::Serialize;

use crate::config::ConfigError;
use crate::pipeline::PipelineError;

/// Process exit codes.
///
/// - 0: Success (every path fingerprinted, every pair compared)
/// - 1: General error (unexpected failure)
/// - 2: Configuration error (rejected before any file was read)
/// - 3: Partial success (some paths failed to load)
/// - 124: Timed out
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: every pair was compared.
    Success = 0,
    /// General error: An unexpected error occurred.
    GeneralError = 1,
    /// Configuration error: invalid settings or too few paths.
    ConfigError = 2,
    /// Partial success: results cover only the paths that loaded.
    PartialSuccess = 3,
    /// Timed out: the global timeout expired.
    TimedOut = 124,
    /// Interrupted: the run was interrupted by user (Ctrl+C).
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "CS000",
            Self::GeneralError => "CS001",
            Self::ConfigError => "CS002",
            Self::PartialSuccess => "CS003",
            Self::TimedOut => "CS124",
            Self::Interrupted => "CS130",
        }
    }

    /// Exit code for an error that ended the run.
    #[must_use]
    pub fn from_error(err: &anyhow::Error) -> Self {
        if let Some(e) = err.downcast_ref::<PipelineError>() {
            return match e {
                PipelineError::Config(_) => Self::ConfigError,
                PipelineError::Interrupted { .. } => Self::Interrupted,
                PipelineError::TimedOut { .. } => Self::TimedOut,
            };
        }
        if err.downcast_ref::<ConfigError>().is_some() {
            return Self::ConfigError;
        }
        Self::GeneralError
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "CS001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the run was stopped early
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: matches!(exit_code, ExitCode::Interrupted | ExitCode::TimedOut),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::GeneralError.as_i32(), 1);
        assert_eq!(ExitCode::ConfigError.as_i32(), 2);
        assert_eq!(ExitCode::PartialSuccess.as_i32(), 3);
        assert_eq!(ExitCode::TimedOut.as_i32(), 124);
        assert_eq!(ExitCode::Interrupted.as_i32(), 130);
    }

    #[test]
    fn test_from_pipeline_errors() {
        let too_few: anyhow::Error =
            PipelineError::Config(ConfigError::TooFewPaths { found: 1 }).into();
        assert_eq!(ExitCode::from_error(&too_few), ExitCode::ConfigError);

        let interrupted: anyhow::Error = PipelineError::Interrupted { results: 3 }.into();
        assert_eq!(ExitCode::from_error(&interrupted), ExitCode::Interrupted);

        let timed_out: anyhow::Error = PipelineError::TimedOut { results: 0 }.into();
        assert_eq!(ExitCode::from_error(&timed_out), ExitCode::TimedOut);
    }

    #[test]
    fn test_from_config_error_with_context() {
        let err = anyhow::Error::from(ConfigError::InvalidChunkSize(0)).context("Invalid settings");
        assert_eq!(ExitCode::from_error(&err), ExitCode::ConfigError);
    }

    #[test]
    fn test_from_other_error() {
        let err = anyhow::anyhow!("disk on fire");
        assert_eq!(ExitCode::from_error(&err), ExitCode::GeneralError);
    }

    #[test]
    fn test_structured_error() {
        let err: anyhow::Error = PipelineError::TimedOut { results: 2 }.into();
        let structured = StructuredError::new(&err, ExitCode::TimedOut);
        assert_eq!(structured.code, "CS124");
        assert_eq!(structured.exit_code, 124);
        assert!(structured.interrupted);
        assert_eq!(structured.message, "Timed out after 2 results");

        let json = serde_json::to_string(&structured).unwrap();
        assert!(json.contains("\"code\":\"CS124\""));
    }
}
