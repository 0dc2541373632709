//! Business error taxonomy shared by the order and messaging services.
//!
//! Every variant is terminal: the services never retry on them. Only
//! `Unavailable` reflects a transient store fault, and it is surfaced after
//! the store adapter has exhausted its own bounded retries.

use std::fmt;

use crate::OrderStatus;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Referenced entity is absent.
    NotFound(String),
    /// Caller lacks permission on this specific resource.
    Forbidden(String),
    /// Locking or state rule violated (order locked by a dispute, duplicate
    /// open dispute, lost a conditional write).
    Conflict(String),
    /// Target status is not reachable from the current status.
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    /// Requested target names no status at all.
    UnknownStatus { from: OrderStatus, requested: String },
    /// Malformed payload or participant set.
    InvalidArgument(String),
    /// Store timed out or stayed unavailable after retries.
    Unavailable(String),
    /// A stored record could not be decoded.
    Internal(String),
}

impl ServiceError {
    /// Stable machine-readable code for API clients to branch on.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::Forbidden(_) => "FORBIDDEN",
            ServiceError::Conflict(_) => "CONFLICT",
            ServiceError::InvalidTransition { .. } | ServiceError::UnknownStatus { .. } => {
                "INVALID_TRANSITION"
            }
            ServiceError::InvalidArgument(_) => "INVALID_ARGUMENT",
            ServiceError::Unavailable(_) => "UNAVAILABLE",
            ServiceError::Internal(_) => "INTERNAL",
        }
    }

    pub fn not_found(what: impl fmt::Display) -> Self {
        ServiceError::NotFound(format!("{what} not found"))
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::NotFound(msg)
            | ServiceError::Forbidden(msg)
            | ServiceError::Conflict(msg)
            | ServiceError::InvalidArgument(msg)
            | ServiceError::Unavailable(msg)
            | ServiceError::Internal(msg) => write!(f, "{}: {msg}", self.code()),
            ServiceError::InvalidTransition { from, to } => {
                write!(f, "INVALID_TRANSITION: {from} -> {to} is not allowed")
            }
            ServiceError::UnknownStatus { from, requested } => {
                write!(f, "INVALID_TRANSITION: {from} -> '{requested}' is not a status")
            }
        }
    }
}

impl std::error::Error for ServiceError {}
