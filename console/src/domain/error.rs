//! Domain-level error type shared by every console operation.
//!
//! Adapters fold their own failures into [`Error`] so callers match on a
//! single [`ErrorCode`] regardless of where the request failed.

use query_cache::{MutationError, QueryError};
use serde::{Deserialize, Serialize};

/// Stable machine-readable error code describing the failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Input was rejected before any request left the client.
    Validation,
    /// The server answered 401 for an authenticated request.
    Unauthorized,
    /// The server answered with a non-success status.
    Server,
    /// The request never produced a response.
    Transport,
    /// The response body could not be decoded.
    Decode,
    /// An equivalent operation is still in flight.
    Busy,
    /// An unexpected failure inside the client.
    Internal,
}

impl ErrorCode {
    const fn fallback_message(self) -> &'static str {
        match self {
            Self::Validation => "invalid input",
            Self::Unauthorized => "session expired",
            Self::Server => "request failed",
            Self::Transport => "network request failed",
            Self::Decode => "unexpected response from server",
            Self::Busy => "operation already in progress",
            Self::Internal => "internal error",
        }
    }
}

/// Console error payload.
///
/// ## Invariants
/// - `message` is never blank; blank input falls back to a per-code default.
///
/// # Examples
/// ```
/// use clinic_console::domain::{Error, ErrorCode};
///
/// let err = Error::server(404, "Patient not found");
/// assert_eq!(err.code(), ErrorCode::Server);
/// assert_eq!(err.status(), Some(404));
/// assert_eq!(err.notice().as_deref(), Some("Patient not found"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    code: ErrorCode,
    message: String,
    status: Option<u16>,
}

impl Error {
    /// Create an error; blank messages are replaced by the code's default.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            code.fallback_message().to_owned()
        } else {
            message
        };
        Self {
            code,
            message,
            status: None,
        }
    }

    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// HTTP status when the server answered.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    /// Attach the HTTP status the server answered with.
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Whether the failure already ended the session.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.code == ErrorCode::Unauthorized
    }

    /// Text for a user-facing notice.
    ///
    /// Unauthorized failures return `None`: the session guard has already
    /// signed the user out and redirected, so no further notice is shown.
    #[must_use]
    pub fn notice(&self) -> Option<String> {
        (!self.is_unauthorized()).then(|| self.message.clone())
    }

    /// Convenience constructor for [`ErrorCode::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    /// Convenience constructor for [`ErrorCode::Unauthorized`].
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message).with_status(401)
    }

    /// Convenience constructor for [`ErrorCode::Server`].
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Server, message).with_status(status)
    }

    /// Convenience constructor for [`ErrorCode::Transport`].
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Transport, message)
    }

    /// Convenience constructor for [`ErrorCode::Decode`].
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Decode, message)
    }

    /// Convenience constructor for [`ErrorCode::Busy`].
    pub fn busy(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Busy, message)
    }

    /// Convenience constructor for [`ErrorCode::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

impl From<QueryError<Self>> for Error {
    fn from(value: QueryError<Self>) -> Self {
        match value {
            QueryError::Fetch(error) => error,
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<MutationError<Self>> for Error {
    fn from(value: MutationError<Self>) -> Self {
        match value {
            MutationError::Failed(error) => error,
            MutationError::Aborted => Self::internal(value.to_string()),
        }
    }
}
