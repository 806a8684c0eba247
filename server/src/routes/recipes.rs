//! Recipe routes.

use axum::{
    extract::State,
    routing::{delete, post},
    Json, Router,
};

use crate::auth::AuthUser;
use crate::db::Outcome;
use crate::handlers::{
    handle_recipe_delete, handle_recipe_upsert, RecipeDelete, RecipeDeleted, RecipeSaved,
    RecipeUpsert,
};
use crate::AppState;

/// Create recipe routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/recipes/upsert", post(upsert_handler))
        .route("/recipes", delete(delete_handler))
}

/// POST /recipes/upsert - Save a recipe with its ingredient lines.
async fn upsert_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<RecipeUpsert>,
) -> Outcome<RecipeSaved> {
    handle_recipe_upsert(&state, auth.id(), request).await
}

/// DELETE /recipes - Delete a recipe and its lines.
async fn delete_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<RecipeDelete>,
) -> Outcome<RecipeDeleted> {
    handle_recipe_delete(&state, auth.id(), request).await
}
