//! Transactional units of work and their classified outcomes.
//!
//! [`run`] opens a transaction, hands its connection to the work closure,
//! commits on success and rolls back on failure. Failures never propagate as
//! errors: they become an [`Outcome`] carrying the taxonomy kind and the
//! client-safe message, and one log line naming the operation.

use super::Pool;
use crate::error::{status_for, AppError, Result};
use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::future::BoxFuture;
use larder_engine::ErrorKind;
use serde::Serialize;
use sqlx::PgConnection;

/// Result of one unit of work.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success { data: T, message: String },
    Failure { kind: ErrorKind, message: String },
}

impl<T> Outcome<T> {
    pub fn success(data: T, message: impl Into<String>) -> Self {
        Outcome::Success {
            data,
            message: message.into(),
        }
    }

    /// Classify and log a failure of `operation`.
    pub fn failure(operation: &str, err: &AppError) -> Self {
        let kind = err.kind();
        if kind.is_error() {
            tracing::error!(%kind, operation, error = %err, "{}", kind.log_message());
        } else {
            tracing::info!(%kind, operation, "{}", kind.log_message());
        }
        Outcome::Failure {
            kind,
            message: kind.client_message().to_string(),
        }
    }

    /// `None` on success.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Failure { kind, .. } => Some(*kind),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Outcome::Success { message, .. } | Outcome::Failure { message, .. } => message,
        }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Outcome::Success { data, .. } => Some(data),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            Outcome::Success { data, .. } => Some(data),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Outcome::Success { .. } => StatusCode::OK,
            Outcome::Failure { kind, .. } => status_for(*kind),
        }
    }
}

/// Run `work` in a fresh transaction.
///
/// Commits when `work` returns `Ok`, rolls back otherwise. A failed commit is
/// classified like any other failure. Nothing is retried.
pub async fn run<T, F>(
    pool: &Pool,
    operation: &str,
    success_message: impl Into<String>,
    work: F,
) -> Outcome<T>
where
    F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T>>,
{
    match transact(pool, work).await {
        Ok(data) => {
            tracing::debug!(operation, "Transaction committed");
            Outcome::success(data, success_message)
        }
        Err(err) => Outcome::failure(operation, &err),
    }
}

async fn transact<T, F>(pool: &Pool, work: F) -> Result<T>
where
    F: for<'c> FnOnce(&'c mut PgConnection) -> BoxFuture<'c, Result<T>>,
{
    let mut tx = pool.begin().await?;
    match work(&mut *tx).await {
        Ok(data) => {
            tx.commit().await?;
            Ok(data)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "Rollback failed");
            }
            Err(err)
        }
    }
}

/// Response body for every outcome.
#[derive(Serialize)]
struct Envelope<T> {
    data: Option<T>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
}

impl<T: Serialize> IntoResponse for Outcome<T> {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Outcome::Success { data, message } => (
                status,
                Json(Envelope {
                    data: Some(data),
                    message,
                    kind: None,
                }),
            )
                .into_response(),
            // 304 carries no body; the message travels as a header.
            Outcome::Failure {
                kind: ErrorKind::NoChange,
                message,
            } => {
                let mut response = status.into_response();
                if let Ok(value) = HeaderValue::try_from(message) {
                    response.headers_mut().insert("message", value);
                }
                response
            }
            Outcome::Failure { kind, message } => (
                status,
                Json(Envelope::<T> {
                    data: None,
                    message,
                    kind: Some(kind),
                }),
            )
                .into_response(),
        }
    }
}
