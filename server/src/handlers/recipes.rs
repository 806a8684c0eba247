//! Recipe endpoints.
//!
//! A recipe is saved together with its ingredient lines in one transaction:
//! the recipe row is upserted and the lines are reconciled against it.

use crate::db::{self, Outcome, ReconcileRequest};
use crate::error::Result;
use crate::AppState;
use futures::FutureExt;
use larder_engine::clock::parse_timestamp;
use larder_engine::{
    check_stale, ChildCollection, DiffCounts, Error, FilterExpression, FilterValue, Projection,
    Record, SelectRequest, Source, Table, Timestamp, SYSTEM_OWNER,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgConnection;

/// Request body for saving a recipe with its ingredient lines.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeUpsert {
    /// The recipe row. Blank fields are ignored; an `id` updates that recipe.
    pub form_data: Record,
    /// Desired ingredient lines, as rows of the composition views.
    #[serde(default)]
    pub recipe_ingredients_rows: Vec<Record>,
    /// When the client loaded the form.
    pub reference_time: String,
}

/// Stored state after saving a recipe.
#[derive(Debug, Serialize)]
pub struct RecipeSaved {
    pub form_data: Record,
    pub recipes_data: Vec<Record>,
    pub recipe_ingredients_loaded: Vec<Record>,
    pub recipe_ingredients_snapshot: Vec<Record>,
    pub counts: DiffCounts,
}

/// Request body for deleting a recipe.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeDelete {
    pub id: i64,
}

/// State after deleting a recipe.
#[derive(Debug, Serialize)]
pub struct RecipeDeleted {
    pub recipes_data: Vec<Record>,
    pub recipe_ingredients_data: Vec<Record>,
}

/// Turn a composition view row into a `recipe_ingredients` row.
///
/// The view's `id_recipe_ingredient` is the line's own key; any `id` on the
/// row belongs to the ingredient and is dropped.
fn line_from_view(mut row: Record) -> Record {
    row.remove("id");
    if let Some(id) = row.remove("id_recipe_ingredient") {
        row.insert("id", id);
    }
    row
}

fn id_source(table: Table, id: FilterValue) -> Result<Source> {
    Ok(SelectRequest::table(table)
        .filtered(FilterExpression::new().and_in("id", [id]))
        .source()?)
}

/// Every row of `table` the caller can see.
async fn select_all(conn: &mut PgConnection, table: Table, caller: &str) -> Result<Vec<Record>> {
    let source = SelectRequest::table(table)
        .source()?
        .restrict_owners(&[caller, SYSTEM_OWNER]);
    db::select(conn, &source, caller).await
}

async fn select_projection(
    conn: &mut PgConnection,
    projection: Projection,
    caller: &str,
) -> Result<Vec<Record>> {
    db::select(conn, &Source::Projection(projection), caller).await
}

/// Save a recipe and reconcile its ingredient lines.
pub async fn handle_recipe_upsert(
    state: &AppState,
    caller: &str,
    request: RecipeUpsert,
) -> Outcome<RecipeSaved> {
    let reference = match parse_timestamp(&request.reference_time) {
        Ok(reference) => reference,
        Err(e) => return Outcome::failure("upsert_recipe", &e.into()),
    };
    let now = state.clock.now();
    let caller = caller.to_string();

    let mut form = request.form_data;
    form.drop_blank();
    let lines: Vec<Record> = request
        .recipe_ingredients_rows
        .into_iter()
        .map(line_from_view)
        .collect();

    db::run(
        &state.pool,
        "upsert_recipe",
        "Recipe updated successfully.",
        |conn| {
            async move { save_recipe(conn, form, lines, &caller, reference, now).await }.boxed()
        },
    )
    .await
}

async fn save_recipe(
    conn: &mut PgConnection,
    mut form: Record,
    lines: Vec<Record>,
    caller: &str,
    reference: Timestamp,
    now: Timestamp,
) -> Result<RecipeSaved> {
    let recipes = Table::Recipes.descriptor();

    if let Some(id) = form.get("id").and_then(FilterValue::from_json) {
        let current = db::select(conn, &id_source(Table::Recipes, id)?, caller).await?;
        check_stale(recipes, &current, reference)?;
    }

    form.stamp_upsert(recipes, caller, now);
    let recipe = db::upsert(conn, Table::Recipes, vec![form], now)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::EmptyResult(Table::Recipes.label().to_string()))?;

    let parent = recipe.get("id").cloned().unwrap_or(Value::Null);
    let id_recipe = parent.as_i64().ok_or_else(|| Error::MissingKey {
        table: recipes.name.to_string(),
        column: "id".to_string(),
    })?;

    let report = db::reconcile(
        conn,
        &ChildCollection::recipe_ingredients(),
        ReconcileRequest {
            parent,
            candidate: lines,
            reference,
        },
        caller,
        now,
    )
    .await?;

    let stored = id_source(Table::Recipes, id_recipe.into())?;
    let form_data = db::select_one(conn, &stored, caller).await?;

    Ok(RecipeSaved {
        form_data,
        recipes_data: select_all(conn, Table::Recipes, caller).await?,
        recipe_ingredients_loaded: select_projection(
            conn,
            Projection::RecipeCompositionLoaded { id_recipe },
            caller,
        )
        .await?,
        recipe_ingredients_snapshot: select_projection(
            conn,
            Projection::RecipeCompositionSnapshot { id_recipe },
            caller,
        )
        .await?,
        counts: report.counts,
    })
}

/// Delete one of the caller's recipes with its lines.
///
/// Only rows the caller created are removed. Deleting nothing is `NoChange`,
/// and a line another user added to the recipe makes the delete fail with
/// `ConstraintViolation`.
pub async fn handle_recipe_delete(
    state: &AppState,
    caller: &str,
    request: RecipeDelete,
) -> Outcome<RecipeDeleted> {
    let caller = caller.to_string();

    db::run(
        &state.pool,
        "delete_recipe",
        "Recipe deleted successfully.",
        |conn| async move { delete_recipe(conn, request.id, &caller).await }.boxed(),
    )
    .await
}

async fn delete_recipe(conn: &mut PgConnection, id: i64, caller: &str) -> Result<RecipeDeleted> {
    let lines = Table::RecipeIngredients.descriptor();
    let recipes = Table::Recipes.descriptor();

    let lines_filter = FilterExpression::new().and_in("id_recipe", [id]).build(lines)?;
    db::delete_owned(conn, Table::RecipeIngredients, &lines_filter, caller).await?;

    let recipe_filter = FilterExpression::new().and_in("id", [id]).build(recipes)?;
    let deleted = db::delete_owned(conn, Table::Recipes, &recipe_filter, caller).await?;
    if deleted.is_empty() {
        return Err(Error::NoChange(format!("no recipe {id} owned by the caller")).into());
    }

    Ok(RecipeDeleted {
        recipes_data: select_all(conn, Table::Recipes, caller).await?,
        recipe_ingredients_data: select_projection(conn, Projection::RecipeCompositionEmpty, caller)
            .await?,
    })
}
