//! CLI-specific error types and mappings.
//!
//! This module provides the error type for the CLI adapter and maps library
//! errors to exit codes and user-facing messages.

use lector_core::{NarrationError, SettingsError};
use thiserror::Error;

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Narration pipeline error.
    #[error("{0}")]
    Narration(String),

    /// Argument error.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// IO error (file not found, permission denied, etc.).
    #[error("IO error: {0}")]
    Io(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CliError {
    /// Map error to appropriate exit code.
    ///
    /// Exit codes follow Unix conventions:
    /// - 0: Success
    /// - 1: General error
    /// - 2: Misuse of shell command (invalid arguments)
    /// - 64-78: Reserved for specific error categories (see sysexits.h)
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Narration(_) => 1,
            Self::Arguments(_) => 2, // EX_USAGE
            Self::Io(_) => 74,       // EX_IOERR
            Self::Config(_) => 78,   // EX_CONFIG
        }
    }
}

impl From<NarrationError> for CliError {
    fn from(err: NarrationError) -> Self {
        Self::Narration(err.to_string())
    }
}

impl From<SettingsError> for CliError {
    fn from(err: SettingsError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::Narration("x".into()).exit_code(), 1);
        assert_eq!(CliError::Arguments("x".into()).exit_code(), 2);
        assert_eq!(CliError::Io("x".into()).exit_code(), 74);
        assert_eq!(CliError::Config("x".into()).exit_code(), 78);
    }

    #[test]
    fn test_settings_errors_are_config_errors() {
        let err: CliError = SettingsError::InvalidBatchSize(0).into();
        assert!(matches!(err, CliError::Config(_)));
        assert_eq!(err.exit_code(), 78);
    }

    #[test]
    fn test_narration_error_message_is_kept() {
        let err: CliError = NarrationError::navigation("end of book").into();
        assert_eq!(err.to_string(), "navigation failed: end of book");
    }
}
