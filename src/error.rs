//! Error types for the Rota scheduling engine.

use thiserror::Error;

use crate::availability::UnavailableReason;

/// Main error type for Rota operations.
#[derive(Error, Debug)]
pub enum RotaError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("Remote calendar error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration-related errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Input validation errors. Rejected immediately, never retried.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Invalid duration: {0} minutes")]
    InvalidDuration(i64),

    #[error("Start time is in the past")]
    PastStart,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid time range: start must be before end")]
    InvalidTimeRange,

    #[error("Malformed time of day (expected HH:MM): {0}")]
    MalformedTime(String),
}

/// Booking conflicts detected at validation time.
#[derive(Error, Debug)]
pub enum ConflictError {
    #[error("Requested slot is unavailable: {reason}")]
    SlotUnavailable { reason: UnavailableReason },

    #[error("Requested time is not a bookable slot")]
    OutsideSchedule,

    #[error("Booking not found: {0}")]
    NotFound(String),

    #[error("Booking already cancelled: {0}")]
    AlreadyCancelled(String),
}

/// External calendar provider errors.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Provider request failed with status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Provider unreachable: {0}")]
    Unreachable(String),

    #[error("Request timed out")]
    Timeout,

    #[error("No valid credential for subject: {0}")]
    Credential(String),

    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: usize, last_error: String },

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),
}

impl RemoteError {
    /// Whether this failure is worth retrying (network-level or 5xx).
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Http { status, .. } => *status >= 500,
            RemoteError::Unreachable(_) | RemoteError::Timeout => true,
            _ => false,
        }
    }
}

/// Booking-store errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result type alias for Rota operations.
pub type Result<T> = std::result::Result<T, RotaError>;
