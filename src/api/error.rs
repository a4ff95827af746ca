//! Transport error types shared by the REST and RPC clients.

use thiserror::Error;

/// Errors that can occur while talking to a JIRA endpoint.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Authentication failed - invalid username or password.
    #[error("Authentication failed: check your username and password")]
    Unauthorized,

    /// Permission denied - user lacks access to the resource.
    #[error("Permission denied: you don't have access to this resource")]
    Forbidden,

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Rate limited by the JIRA server.
    #[error("Rate limited: please wait before retrying")]
    RateLimited,

    /// JIRA server error.
    #[error("JIRA server error: {0}")]
    ServerError(String),

    /// Request rejected by the server (validation failures and the like).
    #[error("{0}")]
    BadRequest(String),

    /// Network or HTTP error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Invalid response from the server.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A fault object returned by the legacy RPC service.
    #[error("{message}")]
    Fault {
        /// The JSON-RPC error code.
        code: i64,
        /// The fault text with the remote exception class stripped.
        message: String,
    },
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Create an error from an HTTP status code.
    pub fn from_status(status: reqwest::StatusCode, context: &str) -> Self {
        match status.as_u16() {
            400 => ApiError::BadRequest(context.to_string()),
            401 => ApiError::Unauthorized,
            403 => ApiError::Forbidden,
            404 => ApiError::NotFound(context.to_string()),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(format!("HTTP {}: {}", status, context)),
            _ => ApiError::ServerError(format!("Unexpected HTTP {}: {}", status, context)),
        }
    }

    /// Create a fault from the raw fault string of the RPC service.
    ///
    /// Fault strings look like `com.atlassian...RemoteException: Issue does not exist`;
    /// only the part after the first colon is meant for people.
    pub fn fault(code: i64, raw: &str) -> Self {
        let message = match raw.split_once(':') {
            Some((_, rest)) if !rest.trim().is_empty() => rest.trim().to_string(),
            _ => raw.trim().to_string(),
        };
        ApiError::Fault { code, message }
    }

    /// Whether this error means the requested entity does not exist.
    ///
    /// The RPC service reports missing issues as a permission fault whose
    /// text says the issue "does not exist".
    pub fn is_not_found(&self) -> bool {
        match self {
            ApiError::NotFound(_) => true,
            ApiError::Fault { message, .. } => message.to_lowercase().contains("does not exist"),
            _ => false,
        }
    }
}
