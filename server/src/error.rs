//! Unified error handling for the server.
//!
//! Every failure is placed in the engine's [`ErrorKind`] taxonomy. Storage
//! errors are classified by SQLSTATE class, engine errors carry their own
//! kind, and the kind alone decides the HTTP status.

use axum::http::StatusCode;
use larder_engine::ErrorKind;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] larder_engine::Error),
}

impl AppError {
    /// Place this error in the fixed taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Database(e) => classify(e),
            AppError::Engine(e) => e.kind(),
        }
    }
}

/// Classify a sqlx error.
pub fn classify(err: &sqlx::Error) -> ErrorKind {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .map(|code| classify_sqlstate(&code))
            .unwrap_or(ErrorKind::Unknown),
        sqlx::Error::RowNotFound => ErrorKind::EmptyResult,
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => ErrorKind::Unavailable,
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Protocol(_) => ErrorKind::InternalError,
        _ => ErrorKind::Unknown,
    }
}

/// Classify by the two-character SQLSTATE class.
pub fn classify_sqlstate(code: &str) -> ErrorKind {
    match code.get(..2).unwrap_or_default() {
        "23" => ErrorKind::ConstraintViolation,
        "42" | "22" | "26" | "34" | "3D" | "3F" => ErrorKind::StatementError,
        "08" | "53" | "57" | "40" => ErrorKind::Unavailable,
        "XX" | "25" | "2D" => ErrorKind::InternalError,
        _ => ErrorKind::Unknown,
    }
}

/// HTTP status for an outcome kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::ConstraintViolation
        | ErrorKind::ValidationError
        | ErrorKind::StaleData
        | ErrorKind::EmptyResult
        | ErrorKind::MissingKey
        | ErrorKind::ProtectedRecord => StatusCode::BAD_REQUEST,
        ErrorKind::StatementError | ErrorKind::InternalError | ErrorKind::Unknown => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::NoChange => StatusCode::NOT_MODIFIED,
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlstate_classes() {
        assert_eq!(classify_sqlstate("23505"), ErrorKind::ConstraintViolation);
        assert_eq!(classify_sqlstate("23503"), ErrorKind::ConstraintViolation);
        assert_eq!(classify_sqlstate("42P01"), ErrorKind::StatementError);
        assert_eq!(classify_sqlstate("22P02"), ErrorKind::StatementError);
        assert_eq!(classify_sqlstate("3D000"), ErrorKind::StatementError);
        assert_eq!(classify_sqlstate("08006"), ErrorKind::Unavailable);
        assert_eq!(classify_sqlstate("40001"), ErrorKind::Unavailable);
        assert_eq!(classify_sqlstate("57P01"), ErrorKind::Unavailable);
        assert_eq!(classify_sqlstate("XX000"), ErrorKind::InternalError);
        assert_eq!(classify_sqlstate("25P02"), ErrorKind::InternalError);
        assert_eq!(classify_sqlstate("P0001"), ErrorKind::Unknown);
        assert_eq!(classify_sqlstate(""), ErrorKind::Unknown);
    }

    #[test]
    fn driver_errors() {
        assert_eq!(classify(&sqlx::Error::RowNotFound), ErrorKind::EmptyResult);
        assert_eq!(classify(&sqlx::Error::PoolTimedOut), ErrorKind::Unavailable);
        assert_eq!(classify(&sqlx::Error::PoolClosed), ErrorKind::Unavailable);
        assert_eq!(
            classify(&sqlx::Error::ColumnNotFound("x".into())),
            ErrorKind::InternalError
        );
    }

    #[test]
    fn statuses() {
        assert_eq!(status_for(ErrorKind::NoChange), StatusCode::NOT_MODIFIED);
        assert_eq!(status_for(ErrorKind::StaleData), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(ErrorKind::Unavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(ErrorKind::StatementError),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn app_error_kinds() {
        let err = AppError::from(larder_engine::Error::Protected("units".into()));
        assert_eq!(err.kind(), ErrorKind::ProtectedRecord);
        let err = AppError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(err.kind().is_retryable());
    }
}
