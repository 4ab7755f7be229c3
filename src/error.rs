//! Error types for RosterCore.
//!
//! This module defines all error types used throughout the library.
//! Validation failures are local and never reach the sync client; everything
//! else is a `RosterError`.

use chrono::NaiveDate;
use thiserror::Error;

/// Result type alias for RosterCore operations
pub type RosterResult<T> = Result<T, RosterError>;

/// Main error type for RosterCore operations
#[derive(Error, Debug)]
pub enum RosterError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Authentication expired. Please log in again.")]
    Unauthorized,

    #[error("Decoding error: {0}")]
    Decoding(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("UUID error: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Record store lock poisoned")]
    LockPoisoned,
}

impl RosterError {
    /// Create a new server error
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        RosterError::Server {
            status,
            message: message.into(),
        }
    }

    /// Create a new decoding error
    pub fn decoding(message: impl Into<String>) -> Self {
        RosterError::Decoding(message.into())
    }

    /// Whether a later retry of the same request may succeed.
    ///
    /// Network failures, 5xx and 429 are transient. Other 4xx, decoding and
    /// validation errors are contract errors and retrying would not help.
    pub fn is_retryable(&self) -> bool {
        match self {
            RosterError::Network(_) => true,
            RosterError::Server { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for RosterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RosterError::Decoding(err.to_string())
        } else {
            RosterError::Network(err.to_string())
        }
    }
}

/// A violated per-entity invariant, detected before a record is committed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field '{0}' is missing")]
    MissingRequiredField(String),

    #[error("Field '{0}' has an invalid format")]
    InvalidFormat(String),

    #[error("Field '{0}' has an unknown value")]
    InvalidEnumValue(String),

    #[error("Field '{0}' is out of range")]
    InvalidRange(String),

    #[error("Invalid email format")]
    InvalidEmail,

    #[error("'{start}' must not be after '{end}'")]
    InvalidDateRange {
        start: &'static str,
        end: &'static str,
    },

    #[error("Overlapping leave request already exists from {start} to {end}")]
    OverlappingLeave { start: NaiveDate, end: NaiveDate },
}

impl ValidationError {
    pub fn missing(field: impl Into<String>) -> Self {
        ValidationError::MissingRequiredField(field.into())
    }

    pub fn range(field: impl Into<String>) -> Self {
        ValidationError::InvalidRange(field.into())
    }

    pub fn enum_value(field: impl Into<String>) -> Self {
        ValidationError::InvalidEnumValue(field.into())
    }

    /// Name of the offending field, when the failure is about a single field.
    pub fn field(&self) -> Option<&str> {
        match self {
            ValidationError::MissingRequiredField(f)
            | ValidationError::InvalidFormat(f)
            | ValidationError::InvalidEnumValue(f)
            | ValidationError::InvalidRange(f) => Some(f),
            ValidationError::InvalidEmail => Some("email"),
            ValidationError::InvalidDateRange { start, .. } => Some(start),
            ValidationError::OverlappingLeave { .. } => None,
        }
    }
}
