//! Error types for the migration scout

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the migration scout
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Record-level errors (skip-and-continue)
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid address '{address}': {reason}")]
    AddressFormat { address: String, reason: String },

    // Feed errors
    #[error("Feed transport error: {0}")]
    FeedTransport(String),

    #[error("Feed payload error: {0}")]
    FeedPayload(String),

    // Optional collaborators (risk, verification, notification, blacklist source)
    #[error("{service} unavailable: {reason}")]
    CollaboratorUnavailable { service: String, reason: String },

    // Persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Uncaught at the cycle level; triggers error recovery
    #[error("Cycle failure: {0}")]
    CycleFailure(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Shorthand for a collaborator outage
    pub fn unavailable(service: &str, reason: impl std::fmt::Display) -> Self {
        Error::CollaboratorUnavailable {
            service: service.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::FeedTransport(_) | Error::CollaboratorUnavailable { .. }
        )
    }

    /// Check if this error only concerns a single record and the batch
    /// should continue
    pub fn is_record_scoped(&self) -> bool {
        matches!(
            self,
            Error::Parse(_)
                | Error::AddressFormat { .. }
                | Error::Storage(_)
                | Error::CollaboratorUnavailable { .. }
        )
    }
}

// Conversion from rusqlite errors
impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from HTTP client errors (feed requests)
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::FeedTransport(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
