//! Centralized error types for jiracli.
//!
//! Every bridge operation and command processor fails with an [`AppError`].
//! The first five variants are the error kinds the command line reports to the
//! user; the rest wrap local failures.

use thiserror::Error;

use crate::api::ApiError;
use crate::config::ConfigError;
use crate::editor::ExternalEditorError;

/// How loudly an error is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Printed in red; the command failed.
    Critical,
    /// Printed in yellow; the command stopped without failing.
    Warning,
}

/// The main application error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// The remote service rejected the credentials.
    #[error("{0}")]
    Authentication(String),

    /// The remote endpoint is unreachable or is not a JIRA instance.
    #[error("{0}")]
    Initialization(String),

    /// Arguments are invalid given the current remote state.
    #[error("{0}")]
    Usage(String),

    /// Advisory that ends the current operation without failing it.
    #[error("{0}")]
    UsageWarning(String),

    /// A protocol fault, carrying the remote error text.
    #[error("{0}")]
    Cli(String),

    /// Configuration-related errors.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// External editor failures.
    #[error("{0}")]
    Editor(#[from] ExternalEditorError),

    /// IO errors (file system, etc.).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Create a usage error.
    pub fn usage(msg: impl Into<String>) -> Self {
        AppError::Usage(msg.into())
    }

    /// Create a usage warning.
    pub fn warning(msg: impl Into<String>) -> Self {
        AppError::UsageWarning(msg.into())
    }

    /// Create a CLI error.
    pub fn cli(msg: impl Into<String>) -> Self {
        AppError::Cli(msg.into())
    }

    /// How this error should be reported.
    pub fn severity(&self) -> Severity {
        match self {
            AppError::UsageWarning(_) => Severity::Warning,
            _ => Severity::Critical,
        }
    }

    /// Whether re-entering credentials could resolve this error.
    pub fn is_recoverable_by_login(&self) -> bool {
        matches!(
            self,
            AppError::Authentication(_) | AppError::Initialization(_)
        )
    }

    /// Get a single-line message for display.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Authentication(msg) if msg.is_empty() => {
                "invalid username/password".to_string()
            }
            AppError::Initialization(msg) if msg.is_empty() => "invalid jira location".to_string(),
            AppError::Config(e) => format!("Configuration error: {}", e),
            other => other.to_string(),
        }
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized => AppError::Authentication(err.to_string()),
            other => AppError::Cli(other.to_string()),
        }
    }
}

/// Result type for application operations.
pub type Result<T> = std::result::Result<T, AppError>;
