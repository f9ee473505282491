//! Error types for Handoff

use thiserror::Error;

/// Main error type for Handoff operations
///
/// Every variant maps to a stable machine code via [`Error::kind`], which the
/// HTTP layer pairs with a status code. Storage detail is carried for logging
/// only and never returned to clients.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing input
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Unknown session or user
    #[error("{0}")]
    NotFound(String),

    /// Session is past its `expiresAt`
    #[error("{0}")]
    Expired(String),

    /// A state-machine guard was violated
    #[error("{0}")]
    Conflict(String),

    /// Caller did not prove an identity
    #[error("Authentication required: {0}")]
    Unauthorized(String),

    /// Caller is known but not allowed to act on this resource
    #[error("Not allowed: {0}")]
    Forbidden(String),

    /// A backing store could not be reached
    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using Handoff's Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Error::Conflict(message.into())
    }

    /// Unknown session. The message tells the user what to do next.
    pub fn session_not_found() -> Self {
        Error::NotFound("Session not found. Please generate a new code.".to_string())
    }

    /// Expired session. Kept distinct from not-found so clients can say which.
    pub fn session_expired() -> Self {
        Error::Expired("Session expired. Please generate a new code.".to_string())
    }

    /// Stable machine-readable code for this error
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Expired(_) => "EXPIRED",
            Error::Conflict(_) => "CONFLICT",
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::Forbidden(_) => "FORBIDDEN",
            Error::Upstream(_) | Error::Io(_) | Error::Json(_) => "UPSTREAM_ERROR",
        }
    }

    /// Whether this error belongs to the authorization family
    pub fn is_authorization(&self) -> bool {
        matches!(self, Error::Unauthorized(_) | Error::Forbidden(_))
    }

    /// Whether the detail of this error must stay server-side
    pub fn is_internal(&self) -> bool {
        matches!(self, Error::Upstream(_) | Error::Io(_) | Error::Json(_))
    }
}
