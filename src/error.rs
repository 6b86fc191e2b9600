//! Error taxonomy
//!
//! Every DAO, registry and action failure is a [`DaoError`]. Hosts branch on the
//! kind (not found, in use, cancelled, ...) and show [`DaoError::user_message`]
//! instead of raw upstream text.

use crate::dao::Operation;
use thiserror::Error;

/// Result alias used across the core
pub type Result<T, E = DaoError> = std::result::Result<T, E>;

/// Maximum length of a user-facing error message
const MAX_USER_MESSAGE_LENGTH: usize = 80;

#[derive(Debug, Error)]
pub enum DaoError {
    /// Get/Delete target does not exist upstream.
    #[error("{kind} {id} not found")]
    NotFound { kind: String, id: String },

    /// Delete rejected because the resource still has dependents.
    #[error("{kind} {id} is in use: {reason}")]
    InUse {
        kind: String,
        id: String,
        reason: String,
    },

    /// An action operation identifier with no matching executor case.
    #[error("unknown operation: {operation}")]
    UnknownOperation { operation: String },

    /// The DAO does not implement the requested capability.
    #[error("operation not supported: {operation}")]
    Unsupported { operation: Operation },

    /// Any other upstream failure, with the call and target it belongs to.
    #[error("{operation} {target}: {source:#}")]
    Upstream {
        operation: String,
        target: String,
        /// HTTP status when the failure came from an API response
        status: Option<u16>,
        #[source]
        source: anyhow::Error,
    },

    /// The caller passed an argument the core cannot act on.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The request context was cancelled before the call completed.
    #[error("request cancelled")]
    Cancelled,

    /// The request context deadline elapsed before the call completed.
    #[error("request deadline exceeded")]
    DeadlineExceeded,

    /// Writes are disabled for this session.
    #[error("read-only mode: write operations are disabled")]
    ReadOnly,

    /// Adapter or action registration is inconsistent.
    #[error("registration error: {0}")]
    Registration(String),
}

impl DaoError {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn in_use(kind: impl Into<String>, id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InUse {
            kind: kind.into(),
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn unknown_operation(operation: impl Into<String>) -> Self {
        Self::UnknownOperation {
            operation: operation.into(),
        }
    }

    /// Wrap an arbitrary upstream failure with the call name and target id,
    /// e.g. `upstream("delete load balancer", "lb-1", err)`.
    pub fn upstream(
        operation: impl Into<String>,
        target: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Upstream {
            operation: operation.into(),
            target: target.into(),
            status: None,
            source: source.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Classify an upstream HTTP status into an error kind.
    ///
    /// 404 maps to [`DaoError::NotFound`], 409 to [`DaoError::InUse`]; every other
    /// status becomes [`DaoError::Upstream`] with the status in its cause.
    pub fn from_status(status: u16, operation: &str, kind: &str, target: &str, message: &str) -> Self {
        match status {
            404 => Self::not_found(kind, target),
            409 => Self::in_use(kind, target, message),
            _ => Self::Upstream {
                operation: format!("{} {}", operation, kind),
                target: target.to_string(),
                status: Some(status),
                source: anyhow::anyhow!("API request failed: {} {}", status, message),
            },
        }
    }

    /// HTTP status of an upstream failure, when known
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => *status,
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_in_use(&self) -> bool {
        matches!(self, Self::InUse { .. })
    }

    /// True for both explicit cancellation and an elapsed deadline.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Short, sanitized message for display
    ///
    /// Upstream causes with an HTTP status are not echoed: they may carry API
    /// response bodies. Known statuses get a fixed explanation instead.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound { kind, id } => sanitize(&format!("{} '{}' not found.", kind, id)),
            Self::InUse { kind, id, .. } => sanitize(&format!(
                "{} '{}' is in use by other resources and cannot be deleted.",
                kind, id
            )),
            Self::UnknownOperation { operation } => {
                sanitize(&format!("Unknown operation '{}'.", operation))
            }
            Self::Unsupported { operation } => {
                format!("This resource does not support {}.", operation)
            }
            Self::Cancelled => "Request cancelled.".to_string(),
            Self::DeadlineExceeded => "Request timed out. Please try again.".to_string(),
            Self::ReadOnly => "Read-only mode: write operations are disabled.".to_string(),
            Self::Registration(_) => "Internal configuration error.".to_string(),
            Self::InvalidArgument(message) => sanitize(&format!("Invalid argument: {}.", message)),
            Self::Upstream {
                status: Some(status), ..
            } => status_message(*status).to_string(),
            Self::Upstream {
                status: None, source, ..
            } => sanitize(&format!("{:#}", source)),
        }
    }
}

fn status_message(status: u16) -> &'static str {
    match status {
        400 => "Invalid request. Check your parameters.",
        401 => "Authentication failed. Refresh your credentials.",
        403 => "Permission denied. Check your IAM permissions.",
        429 => "Rate limit exceeded. Please try again later.",
        500..=599 => "Service temporarily unavailable. Please try again.",
        _ => "Request failed. Check your network connection and try again.",
    }
}

/// Strip control characters and truncate
fn sanitize(message: &str) -> String {
    let printable = message.chars().filter(|c| !c.is_control());
    let mut sanitized: String = printable.clone().take(MAX_USER_MESSAGE_LENGTH).collect();

    if printable.count() > MAX_USER_MESSAGE_LENGTH {
        sanitized.push_str("...");
    }
    sanitized
}
