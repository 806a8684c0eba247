//! Generic CRUD routes.

use axum::{
    extract::State,
    routing::{delete, post, put},
    Json, Router,
};
use larder_engine::{DeleteRequest, Operation, Record, SelectRequest, WriteRequest};

use crate::auth::AuthUser;
use crate::db::Outcome;
use crate::handlers::{
    handle_delete, handle_insert, handle_operation, handle_select, handle_update, handle_upsert,
};
use crate::AppState;

/// Create CRUD routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/crud", post(operation_handler))
        .route("/crud/select", post(select_handler))
        .route("/crud/insert", post(insert_handler))
        .route("/crud/update", put(update_handler))
        .route("/crud/delete", delete(delete_handler))
        .route("/crud/upsert", post(upsert_handler))
}

/// POST /crud - Run a tagged operation.
async fn operation_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(operation): Json<Operation>,
) -> Outcome<Vec<Record>> {
    handle_operation(&state, auth.id(), operation).await
}

/// POST /crud/select - Read from a table or projection.
async fn select_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<SelectRequest>,
) -> Outcome<Vec<Record>> {
    handle_select(&state, auth.id(), request).await
}

/// POST /crud/insert - Insert rows.
async fn insert_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<WriteRequest>,
) -> Outcome<Vec<Record>> {
    handle_insert(&state, auth.id(), request).await
}

/// PUT /crud/update - Update rows by primary key.
async fn update_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<WriteRequest>,
) -> Outcome<Vec<Record>> {
    handle_update(&state, auth.id(), request).await
}

/// DELETE /crud/delete - Delete filtered rows.
async fn delete_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<DeleteRequest>,
) -> Outcome<Vec<Record>> {
    handle_delete(&state, auth.id(), request).await
}

/// POST /crud/upsert - Insert or replace rows.
async fn upsert_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<WriteRequest>,
) -> Outcome<Vec<Record>> {
    handle_upsert(&state, auth.id(), request).await
}
