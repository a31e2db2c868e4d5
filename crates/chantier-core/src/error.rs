//! Error types for Chantier.
//!
//! This module provides a unified error type for all catalog operations,
//! designed for clean exposure to any presentation layer sitting on top.

use thiserror::Error;

/// Result type alias for Chantier operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in catalog operations.
///
/// Each variant includes a descriptive error message suitable for end-users.
/// Error codes follow the pattern `CHANT-XXX` for easy debugging.
#[derive(Error, Debug)]
pub enum Error {
    /// Record not found (CHANT-001).
    #[error("[CHANT-001] Record '{0}' not found")]
    NotFound(crate::record::RecordId),

    /// Uniqueness violation on create (CHANT-002).
    ///
    /// Names the conflicting field so callers can surface a precise message.
    #[error("[CHANT-002] Duplicate value for unique field '{field}'")]
    DuplicateKey {
        /// Field whose uniqueness constraint was violated.
        field: &'static str,
    },

    /// Role lacks the requested capability (CHANT-003).
    #[error("[CHANT-003] Permission denied: role '{role}' cannot perform '{operation}'")]
    PermissionDenied {
        /// Role of the denied principal.
        role: crate::record::Role,
        /// Operation that was requested.
        operation: &'static str,
    },

    /// Detected mismatch between index and store (CHANT-004).
    ///
    /// Schedules a full rebuild; only surfaced if the rebuild itself fails.
    #[error("[CHANT-004] Index inconsistency: {0}")]
    IndexInconsistency(String),

    /// Caller-initiated abort of a search (CHANT-005).
    #[error("[CHANT-005] Search cancelled by caller")]
    Cancelled,

    /// Search deadline exceeded (CHANT-006).
    ///
    /// Distinct from [`Error::Cancelled`]: the caller set a deadline and the
    /// engine ran past it.
    #[error("[CHANT-006] Search timed out")]
    Timeout,

    /// Invalid record submitted for indexing (CHANT-007).
    #[error("[CHANT-007] Invalid record: {0}")]
    InvalidRecord(String),

    /// Configuration error (CHANT-008).
    #[error("[CHANT-008] Configuration error: {0}")]
    Config(String),

    /// Backing store error (CHANT-009).
    #[error("[CHANT-009] Storage error: {0}")]
    Storage(String),

    /// IO error (CHANT-010).
    #[error("[CHANT-010] IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the error code (e.g., "CHANT-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "CHANT-001",
            Self::DuplicateKey { .. } => "CHANT-002",
            Self::PermissionDenied { .. } => "CHANT-003",
            Self::IndexInconsistency(_) => "CHANT-004",
            Self::Cancelled => "CHANT-005",
            Self::Timeout => "CHANT-006",
            Self::InvalidRecord(_) => "CHANT-007",
            Self::Config(_) => "CHANT-008",
            Self::Storage(_) => "CHANT-009",
            Self::Io(_) => "CHANT-010",
        }
    }

    /// Returns true if this error is recoverable from the caller's side.
    ///
    /// Index inconsistency and storage failures require operator attention.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::IndexInconsistency(_) | Self::Storage(_))
    }
}

impl From<crate::config::ConfigError> for Error {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
