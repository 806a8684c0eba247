//! Authentication extractor.
//!
//! The bearer token is taken verbatim as the caller's user id. Issuing and
//! verifying tokens happens upstream of this service. The system owner id is
//! reserved for seed rows and is never accepted as a caller.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};
use larder_engine::{UserId, SYSTEM_OWNER};

use crate::AppState;

/// Identity used when no token is sent and auth is not enforced.
pub const ANONYMOUS: &str = "anonymous";

/// Authenticated user extracted from request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    /// The caller's user id
    pub id: UserId,
}

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        match auth_header {
            Some(header) if header.starts_with("Bearer ") => {
                let token = header.trim_start_matches("Bearer ").trim();
                if token.is_empty() {
                    return Err((StatusCode::UNAUTHORIZED, "Empty bearer token"));
                }
                if token == SYSTEM_OWNER {
                    return Err((StatusCode::FORBIDDEN, "Reserved user id"));
                }
                Ok(AuthUser {
                    id: token.to_string(),
                })
            }
            Some(_) => Err((
                StatusCode::UNAUTHORIZED,
                "Invalid authorization header format",
            )),
            None if state.config.auth_secret.is_none() => Ok(AuthUser {
                id: ANONYMOUS.to_string(),
            }),
            None => Err((StatusCode::UNAUTHORIZED, "Missing authorization header")),
        }
    }
}
