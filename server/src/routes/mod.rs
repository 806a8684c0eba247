//! HTTP route definitions.

mod crud;
mod health;
mod recipes;
mod users;

use crate::AppState;
use axum::Router;

/// Create all application routes.
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(crud::routes())
        .merge(recipes::routes())
        .merge(users::routes())
}
