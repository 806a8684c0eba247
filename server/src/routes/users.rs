//! User routes.

use axum::{extract::State, routing::get, Router};

use crate::auth::AuthUser;
use crate::db::Outcome;
use crate::handlers::{handle_current_user, CurrentUser};
use crate::AppState;

/// Create user routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/users/me", get(me_handler))
}

/// GET /users/me - The caller's public profile.
async fn me_handler(State(state): State<AppState>, auth: AuthUser) -> Outcome<CurrentUser> {
    handle_current_user(&state, auth.id()).await
}
