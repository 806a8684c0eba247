//! Error types for the Larder engine.
//!
//! [`ErrorKind`] is the fixed failure taxonomy shared by every layer. The
//! engine's own [`Error`] covers failures detected before any statement runs;
//! storage failures are classified into the same kinds by the server.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of every failure the data-access layer can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unique or foreign-key violation.
    ConstraintViolation,
    /// Malformed or invalid statement.
    StatementError,
    /// Storage unreachable.
    Unavailable,
    /// Unclassified storage-side failure.
    InternalError,
    /// Bad filter or record shape.
    ValidationError,
    /// Concurrent modification detected.
    StaleData,
    /// Expected a row, found none.
    EmptyResult,
    /// Required field absent from a record.
    MissingKey,
    /// The operation produced no effect. Not an error.
    NoChange,
    /// Attempted mutation of a system-owned row.
    ProtectedRecord,
    Unknown,
}

impl ErrorKind {
    /// Message safe to hand back to a client.
    pub fn client_message(self) -> &'static str {
        match self {
            ErrorKind::ConstraintViolation => "Integrity error.",
            ErrorKind::StatementError => "Statement error.",
            ErrorKind::Unavailable => "Database is unavailable.",
            ErrorKind::InternalError => "Database error.",
            ErrorKind::ValidationError => "Bad request.",
            ErrorKind::StaleData => "Stale data.",
            ErrorKind::EmptyResult => "Index error.",
            ErrorKind::MissingKey => "Key error.",
            ErrorKind::NoChange => "Unchanged state.",
            ErrorKind::ProtectedRecord => "System data error.",
            ErrorKind::Unknown => "Internal server error.",
        }
    }

    /// Longer description used in log lines.
    pub fn log_message(self) -> &'static str {
        match self {
            ErrorKind::ConstraintViolation => "Attempted to breach database constraints.",
            ErrorKind::StatementError => "Attempted to perform a bad statement.",
            ErrorKind::Unavailable => "Could not reach the database.",
            ErrorKind::InternalError => "An internal error occurred in the database.",
            ErrorKind::ValidationError => "Incoming data did not pass validation.",
            ErrorKind::StaleData => {
                "One or more rows were modified after the client loaded them."
            }
            ErrorKind::EmptyResult => "Expected returning data but none was found.",
            ErrorKind::MissingKey => "The provided data is missing one or more required keys.",
            ErrorKind::NoChange => "No changes were made to the data.",
            ErrorKind::ProtectedRecord => "Cannot modify system data.",
            ErrorKind::Unknown => "An unknown error occurred while interacting with the database.",
        }
    }

    /// Only an unreachable store is worth retrying, and only by the caller.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Unavailable)
    }

    pub fn is_error(self) -> bool {
        self != ErrorKind::NoChange
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ConstraintViolation => "ConstraintViolation",
            ErrorKind::StatementError => "StatementError",
            ErrorKind::Unavailable => "Unavailable",
            ErrorKind::InternalError => "InternalError",
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::StaleData => "StaleData",
            ErrorKind::EmptyResult => "EmptyResult",
            ErrorKind::MissingKey => "MissingKey",
            ErrorKind::NoChange => "NoChange",
            ErrorKind::ProtectedRecord => "ProtectedRecord",
            ErrorKind::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// All possible errors from the Larder engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Validation errors
    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("column '{column}' not found in table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("type mismatch for column '{column}': expected {expected}, got {got}")]
    TypeMismatch {
        column: String,
        expected: String,
        got: String,
    },

    #[error("generated key '{column}' must not be supplied when inserting into '{table}'")]
    GeneratedKey { table: String, column: String },

    #[error("duplicate merge key ({0}) in candidate rows")]
    DuplicateKey(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("missing key '{column}' for table '{table}'")]
    MissingKey { table: String, column: String },

    // State errors
    #[error("stale data in '{table}': row modified at {modified_at}, reference is {reference}")]
    Stale {
        table: String,
        modified_at: String,
        reference: String,
    },

    #[error("cannot delete system-owned rows from '{0}'")]
    Protected(String),

    #[error("expected a row from '{0}' but none was found")]
    EmptyResult(String),

    #[error("no changes were made: {0}")]
    NoChange(String),
}

impl Error {
    /// Place this error in the fixed taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownTable(_)
            | Error::UnknownColumn { .. }
            | Error::TypeMismatch { .. }
            | Error::GeneratedKey { .. }
            | Error::DuplicateKey(_)
            | Error::InvalidTimestamp(_)
            | Error::InvalidRequest(_) => ErrorKind::ValidationError,
            Error::MissingKey { .. } => ErrorKind::MissingKey,
            Error::Stale { .. } => ErrorKind::StaleData,
            Error::Protected(_) => ErrorKind::ProtectedRecord,
            Error::EmptyResult(_) => ErrorKind::EmptyResult,
            Error::NoChange(_) => ErrorKind::NoChange,
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Error::InvalidRequest(reason.into())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
