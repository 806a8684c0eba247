//! Integration tests for the CRUD and reconciliation paths.
//!
//! These tests require a running PostgreSQL database.
//! Set DATABASE_URL environment variable before running; without it every
//! test returns early.

use futures::FutureExt;
use larder_engine::clock::parse_timestamp;
use larder_engine::{
    record, ChildCollection, DeleteRequest, ErrorKind, FilterExpression, FixedClock, Projection,
    Record, SelectRequest, Table, Timestamp, WriteRequest,
};
use larder_server::config::Config;
use larder_server::db::{self, ReconcileRequest};
use larder_server::handlers::{
    handle_delete, handle_insert, handle_recipe_delete, handle_recipe_upsert, handle_select,
    handle_update, handle_upsert, RecipeDelete, RecipeUpsert,
};
use larder_server::AppState;
use serde_json::{json, Value};
use uuid::Uuid;

fn ts(input: &str) -> Timestamp {
    parse_timestamp(input).unwrap()
}

/// Connect, migrate and freeze the clock at `now`.
async fn setup(now: &str) -> Option<AppState> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let config = Config::with_database_url(url);
    let pool = db::create_pool(&config).await.expect("connect to DATABASE_URL");
    db::run_migrations(&pool).await.expect("run migrations");
    Some(AppState::new(pool, config).with_clock(FixedClock(ts(now))))
}

/// A caller no other test shares.
fn new_user() -> String {
    format!("user-{}", Uuid::new_v4())
}

fn id_of(row: &Record) -> i64 {
    row.get("id").and_then(Value::as_i64).expect("row has an id")
}

/// An id no BIGSERIAL column hands out during a test run.
const MISSING_ID: i64 = i64::MAX;

async fn insert_one(state: &AppState, user: &str, table: Table, row: Record) -> Record {
    let outcome = handle_insert(state, user, WriteRequest::new(table, vec![row])).await;
    assert!(outcome.is_success(), "{}", outcome.message());
    outcome.into_data().unwrap().remove(0)
}

async fn select_table(
    state: &AppState,
    user: &str,
    table: Table,
    filters: FilterExpression,
) -> Vec<Record> {
    let outcome = handle_select(state, user, SelectRequest::table(table).filtered(filters)).await;
    assert!(outcome.is_success(), "{}", outcome.message());
    outcome.into_data().unwrap()
}

/// A recipe with one line per quantity, each on a fresh ingredient.
async fn recipe_with_lines(
    state: &AppState,
    user: &str,
    quantities: &[f64],
) -> (i64, Vec<Record>) {
    let recipe = insert_one(state, user, Table::Recipes, record!("name": "Bread")).await;
    let id_recipe = id_of(&recipe);

    let mut lines = Vec::new();
    for (i, quantity) in quantities.iter().enumerate() {
        let ingredient = insert_one(
            state,
            user,
            Table::Ingredients,
            record!("name": format!("ingredient {i}")),
        )
        .await;
        let line = insert_one(
            state,
            user,
            Table::RecipeIngredients,
            record!(
                "id_recipe": id_recipe,
                "id_ingredient": id_of(&ingredient),
                "quantity": quantity
            ),
        )
        .await;
        lines.push(line);
    }
    (id_recipe, lines)
}

async fn reconcile_lines(
    state: &AppState,
    user: &str,
    id_recipe: i64,
    candidate: Vec<Record>,
    reference: Timestamp,
) -> db::Outcome<db::ReconcileReport> {
    let caller = user.to_string();
    let now = state.clock.now();
    let request = ReconcileRequest {
        parent: json!(id_recipe),
        candidate,
        reference,
    };
    db::run(&state.pool, "reconcile", "Reconciled.", |conn| {
        async move {
            let collection = ChildCollection::recipe_ingredients();
            db::reconcile(conn, &collection, request, &caller, now).await
        }
        .boxed()
    })
    .await
}

#[cfg(test)]
mod crud_tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_returns_generated_id_and_projection_lists_it() {
        let Some(state) = setup("2024-03-01T10:00:00").await else {
            return;
        };
        let user = new_user();

        let row = insert_one(
            &state,
            &user,
            Table::Units,
            record!("name": "kg", "abbreviation": "kg", "type": "mass"),
        )
        .await;
        let id = id_of(&row);
        assert_eq!(row.get_str("created_by"), Some(user.as_str()));
        assert_eq!(row.get_str("updated_at"), Some("2024-03-01T10:00:00"));

        let listed = handle_select(
            &state,
            &user,
            SelectRequest::projection(Projection::UnitsView {
                unit_type: Some("mass".to_string()),
            }),
        )
        .await
        .into_data()
        .unwrap();
        assert!(listed.iter().any(|r| r.get("id") == Some(&json!(id))));
    }

    #[tokio::test]
    async fn test_select_is_idempotent() {
        let Some(state) = setup("2024-03-01T10:00:00").await else {
            return;
        };
        let user = new_user();
        insert_one(&state, &user, Table::Skills, record!("name": "knife work")).await;

        let filters = FilterExpression::new().and_in("created_by", [user.as_str()]);
        let first = select_table(&state, &user, Table::Skills, filters.clone()).await;
        let second = select_table(&state, &user, Table::Skills, filters).await;
        assert_eq!(first.len(), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_delete_returns_exactly_the_deleted_rows() {
        let Some(state) = setup("2024-03-01T10:00:00").await else {
            return;
        };
        let user = new_user();
        let a = insert_one(&state, &user, Table::Resources, record!("name": "oven")).await;
        let b = insert_one(&state, &user, Table::Resources, record!("name": "mixer")).await;
        let keep = insert_one(&state, &user, Table::Resources, record!("name": "fridge")).await;

        let outcome = handle_delete(
            &state,
            &user,
            DeleteRequest {
                table: Table::Resources,
                filters: FilterExpression::new().and_in("id", [id_of(&a), id_of(&b)]),
            },
        )
        .await;
        assert!(outcome.is_success(), "{}", outcome.message());
        let mut deleted: Vec<i64> = outcome.into_data().unwrap().iter().map(id_of).collect();
        deleted.sort();
        assert_eq!(deleted, vec![id_of(&a), id_of(&b)]);

        let remaining = select_table(
            &state,
            &user,
            Table::Resources,
            FilterExpression::new().and_in("created_by", [user.as_str()]),
        )
        .await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(id_of(&remaining[0]), id_of(&keep));
    }

    #[tokio::test]
    async fn test_delete_touching_system_rows_changes_nothing() {
        let Some(state) = setup("2024-03-01T10:00:00").await else {
            return;
        };
        let user = new_user();
        let mine = insert_one(&state, &user, Table::Units, record!("name": "cup")).await;
        let system = select_table(
            &state,
            &user,
            Table::Units,
            FilterExpression::new().and_in("created_by", ["system"]),
        )
        .await;
        assert!(!system.is_empty(), "seed units are missing");

        let outcome = handle_delete(
            &state,
            &user,
            DeleteRequest {
                table: Table::Units,
                filters: FilterExpression::new().and_in("id", [id_of(&mine), id_of(&system[0])]),
            },
        )
        .await;
        assert_eq!(outcome.kind(), Some(ErrorKind::ProtectedRecord));

        let still_there = select_table(
            &state,
            &user,
            Table::Units,
            FilterExpression::new().and_in("id", [id_of(&mine)]),
        )
        .await;
        assert_eq!(still_there.len(), 1);
    }

    #[tokio::test]
    async fn test_select_sees_own_and_system_rows_only() {
        let Some(state) = setup("2024-03-01T10:00:00").await else {
            return;
        };
        let owner = new_user();
        let unit = insert_one(&state, &owner, Table::Units, record!("name": "pinch")).await;
        let by_id = FilterExpression::new().and_in("id", [id_of(&unit)]);

        let other = new_user();
        assert!(select_table(&state, &other, Table::Units, by_id.clone()).await.is_empty());
        let asked_for_owner = FilterExpression::new().and_in("created_by", [owner.as_str()]);
        assert!(select_table(&state, &other, Table::Units, asked_for_owner).await.is_empty());

        let visible = select_table(&state, &other, Table::Units, FilterExpression::new()).await;
        assert!(!visible.is_empty());
        assert!(visible.iter().all(|r| r.get_str("created_by") == Some("system")));

        assert_eq!(select_table(&state, &owner, Table::Units, by_id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_leaves_other_users_rows() {
        let Some(state) = setup("2024-03-01T10:00:00").await else {
            return;
        };
        let owner = new_user();
        let unit = insert_one(&state, &owner, Table::Units, record!("name": "dash")).await;
        let other = new_user();

        for filters in [
            FilterExpression::new().and_in("id", [id_of(&unit)]),
            FilterExpression::new().not_like("created_by", "system"),
        ] {
            let request = DeleteRequest {
                table: Table::Units,
                filters,
            };
            let outcome = handle_delete(&state, &other, request).await;
            assert!(outcome.is_success(), "{}", outcome.message());
            assert!(outcome.into_data().unwrap().is_empty());
        }

        let by_id = FilterExpression::new().and_in("id", [id_of(&unit)]);
        assert_eq!(select_table(&state, &owner, Table::Units, by_id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_filter_matches_returned_timestamps() {
        let Some(state) = setup("2024-03-01T10:00:00").await else {
            return;
        };
        let user = new_user();
        let unit = insert_one(&state, &user, Table::Units, record!("name": "tin")).await;
        let updated_at = unit.get_str("updated_at").unwrap().to_string();

        let filters = FilterExpression::new()
            .and_in("updated_at", [updated_at.as_str()])
            .and_in("created_by", [user.as_str()]);
        let rows = select_table(&state, &user, Table::Units, filters).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(id_of(&rows[0]), id_of(&unit));

        let filters = FilterExpression::new()
            .and_in("updated_at", ["2024-03-01 10:00:00"])
            .and_in("created_by", [user.as_str()]);
        assert_eq!(select_table(&state, &user, Table::Units, filters).await.len(), 1);
    }

    #[tokio::test]
    async fn test_update_keeps_creation_columns() {
        let Some(state) = setup("2024-03-01T10:00:00").await else {
            return;
        };
        let user = new_user();
        let bakery = record!("name": "bakery");
        let category = insert_one(&state, &user, Table::Categories, bakery).await;

        let other = new_user();
        let state = state.with_clock(FixedClock(ts("2024-03-02T08:00:00")));
        let change = record!(
            "id": id_of(&category),
            "name": "pastry",
            "created_by": "mallory",
            "created_at": "2000-01-01T00:00:00"
        );
        let outcome = handle_update(
            &state,
            &other,
            WriteRequest::new(Table::Categories, vec![change]),
        )
        .await;
        assert!(outcome.is_success(), "{}", outcome.message());
        let updated = outcome.into_data().unwrap().remove(0);
        assert_eq!(updated.get_str("name"), Some("pastry"));
        assert_eq!(updated.get_str("created_by"), Some(user.as_str()));
        assert_eq!(updated.get_str("created_at"), Some("2024-03-01T10:00:00"));
        assert_eq!(updated.get_str("updated_by"), Some(other.as_str()));
        assert_eq!(updated.get_str("updated_at"), Some("2024-03-02T08:00:00"));
    }

    #[tokio::test]
    async fn test_update_of_missing_row_is_empty_result() {
        let Some(state) = setup("2024-03-01T10:00:00").await else {
            return;
        };
        let change = record!("id": MISSING_ID, "name": "ghost");
        let request = WriteRequest::new(Table::Categories, vec![change]);
        let outcome = handle_update(&state, &new_user(), request).await;
        assert_eq!(outcome.kind(), Some(ErrorKind::EmptyResult));
    }

    #[tokio::test]
    async fn test_failed_update_rolls_back_earlier_records() {
        let Some(state) = setup("2024-03-01T10:00:00").await else {
            return;
        };
        let user = new_user();
        let bakery = record!("name": "bakery");
        let category = insert_one(&state, &user, Table::Categories, bakery).await;

        let changes = vec![
            record!("id": id_of(&category), "name": "renamed"),
            record!("id": MISSING_ID, "name": "ghost"),
        ];
        let outcome =
            handle_update(&state, &user, WriteRequest::new(Table::Categories, changes)).await;
        assert_eq!(outcome.kind(), Some(ErrorKind::EmptyResult));

        let by_id = FilterExpression::new().and_in("id", [id_of(&category)]);
        let rows = select_table(&state, &user, Table::Categories, by_id).await;
        assert_eq!(rows[0].get_str("name"), Some("bakery"));
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_replaces() {
        let Some(state) = setup("2024-03-01T10:00:00").await else {
            return;
        };
        let user = new_user();

        let outcome = handle_upsert(
            &state,
            &user,
            WriteRequest::new(
                Table::Categories,
                vec![record!("name": "bakery", "description": "bread", "type": "recipe")],
            ),
        )
        .await;
        assert!(outcome.is_success(), "{}", outcome.message());
        let created = outcome.into_data().unwrap().remove(0);
        let id = id_of(&created);
        assert_eq!(created.get_str("created_by"), Some(user.as_str()));

        let other = new_user();
        let outcome = handle_upsert(
            &state,
            &other,
            WriteRequest::new(
                Table::Categories,
                vec![record!("id": id, "name": "pastry", "description": null, "type": "recipe")],
            ),
        )
        .await;
        assert!(outcome.is_success(), "{}", outcome.message());
        let replaced = outcome.into_data().unwrap().remove(0);
        assert_eq!(id_of(&replaced), id);
        assert_eq!(replaced.get_str("name"), Some("pastry"));
        assert_eq!(replaced.get("description"), Some(&Value::Null));
        assert_eq!(replaced.get_str("created_by"), Some(user.as_str()));
        assert_eq!(replaced.get_str("updated_by"), Some(other.as_str()));
    }

    #[tokio::test]
    async fn test_empty_insert_is_no_change() {
        let Some(state) = setup("2024-03-01T10:00:00").await else {
            return;
        };
        let request = WriteRequest::new(Table::Units, vec![]);
        let outcome = handle_insert(&state, &new_user(), request).await;
        assert_eq!(outcome.kind(), Some(ErrorKind::NoChange));
    }
}

#[cfg(test)]
mod reconcile_tests {
    use super::*;

    #[tokio::test]
    async fn test_reconcile_inserts_updates_and_deletes() {
        let Some(state) = setup("2024-03-01T10:00:00").await else {
            return;
        };
        let user = new_user();
        let (id_recipe, lines) = recipe_with_lines(&state, &user, &[1.0, 2.0]).await;
        let extra = insert_one(&state, &user, Table::Ingredients, record!("name": "salt")).await;

        let mut kept = lines[1].clone();
        kept.insert("quantity", 5.0);
        let added = record!("id_ingredient": id_of(&extra), "quantity": 3.0);

        let outcome = reconcile_lines(
            &state,
            &user,
            id_recipe,
            vec![kept, added],
            ts("2024-03-01T10:00:00"),
        )
        .await;
        assert!(outcome.is_success(), "{}", outcome.message());
        let report = outcome.into_data().unwrap();
        assert_eq!(
            (report.counts.inserted, report.counts.updated, report.counts.deleted),
            (1, 1, 1)
        );
        assert_eq!(report.rows.len(), 2);
        assert!(report.rows.iter().all(|r| id_of(r) != id_of(&lines[0])));
        let updated = report
            .rows
            .iter()
            .find(|r| id_of(r) == id_of(&lines[1]))
            .unwrap();
        assert_eq!(updated.get("quantity").and_then(Value::as_f64), Some(5.0));
    }

    #[tokio::test]
    async fn test_stale_reconcile_changes_nothing() {
        let Some(state) = setup("2024-03-01T10:00:05").await else {
            return;
        };
        let user = new_user();
        let (id_recipe, lines) = recipe_with_lines(&state, &user, &[1.0]).await;

        let reference = ts("2024-03-01T10:00:00");
        let outcome = reconcile_lines(&state, &user, id_recipe, vec![], reference).await;
        assert_eq!(outcome.kind(), Some(ErrorKind::StaleData));

        let rows = select_table(
            &state,
            &user,
            Table::RecipeIngredients,
            FilterExpression::new().and_in("id_recipe", [id_recipe]),
        )
        .await;
        assert_eq!(rows, lines);
    }

    #[tokio::test]
    async fn test_reconcile_leaves_other_users_lines() {
        let Some(state) = setup("2024-03-01T10:00:00").await else {
            return;
        };
        let owner = new_user();
        let (id_recipe, _) = recipe_with_lines(&state, &owner, &[1.0]).await;
        let other = new_user();

        let reference = ts("2024-03-01T10:00:00");
        let outcome = reconcile_lines(&state, &other, id_recipe, vec![], reference).await;
        assert!(outcome.is_success(), "{}", outcome.message());
        let report = outcome.into_data().unwrap();
        assert_eq!(report.counts.deleted, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.rows.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_reconcile_rolls_back_applied_deletes() {
        let Some(state) = setup("2024-03-01T10:00:00").await else {
            return;
        };
        let user = new_user();
        let (id_recipe, lines) = recipe_with_lines(&state, &user, &[1.0]).await;

        // The delete of the existing line runs before this insert fails.
        let dangling = record!("id_ingredient": MISSING_ID, "quantity": 1.0);
        let reference = ts("2024-03-01T10:00:00");
        let outcome = reconcile_lines(&state, &user, id_recipe, vec![dangling], reference).await;
        assert_eq!(outcome.kind(), Some(ErrorKind::ConstraintViolation));

        let rows = select_table(
            &state,
            &user,
            Table::RecipeIngredients,
            FilterExpression::new().and_in("id_recipe", [id_recipe]),
        )
        .await;
        assert_eq!(rows, lines);
    }

    #[tokio::test]
    async fn test_recipe_delete_never_removes_other_users_lines() {
        let Some(state) = setup("2024-03-01T10:00:00").await else {
            return;
        };
        let owner = new_user();
        let recipe = insert_one(&state, &owner, Table::Recipes, record!("name": "Stew")).await;
        let id_recipe = id_of(&recipe);

        let guest = new_user();
        let salt = insert_one(&state, &guest, Table::Ingredients, record!("name": "salt")).await;
        let line = record!("id_recipe": id_recipe, "id_ingredient": id_of(&salt), "quantity": 2.0);
        insert_one(&state, &guest, Table::RecipeIngredients, line).await;

        let outcome = handle_recipe_delete(&state, &owner, RecipeDelete { id: id_recipe }).await;
        assert_eq!(outcome.kind(), Some(ErrorKind::ConstraintViolation));

        let request = DeleteRequest {
            table: Table::Recipes,
            filters: FilterExpression::new().and_in("id", [id_recipe]),
        };
        let outcome = handle_delete(&state, &owner, request).await;
        assert_eq!(outcome.kind(), Some(ErrorKind::ConstraintViolation));

        let guest_lines = select_table(
            &state,
            &guest,
            Table::RecipeIngredients,
            FilterExpression::new().and_in("id_recipe", [id_recipe]),
        )
        .await;
        assert_eq!(guest_lines.len(), 1);
        let by_id = FilterExpression::new().and_in("id", [id_recipe]);
        assert_eq!(select_table(&state, &owner, Table::Recipes, by_id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_recipe_round_trip() {
        let Some(state) = setup("2024-03-01T10:00:00").await else {
            return;
        };
        let user = new_user();
        let flour = insert_one(&state, &user, Table::Ingredients, record!("name": "flour")).await;

        let request: RecipeUpsert = serde_json::from_value(json!({
            "form_data": {"id": "", "name": "Focaccia", "course": "main"},
            "recipe_ingredients_rows": [{
                "id": id_of(&flour),
                "id_recipe_ingredient": null,
                "id_ingredient": id_of(&flour),
                "name": "flour",
                "quantity": 500
            }],
            "reference_time": "2024-03-01T10:00:00"
        }))
        .unwrap();
        let outcome = handle_recipe_upsert(&state, &user, request).await;
        assert!(outcome.is_success(), "{}", outcome.message());
        let saved = outcome.into_data().unwrap();
        let id_recipe = id_of(&saved.form_data);
        assert_eq!(saved.counts.inserted, 1);
        assert_eq!(saved.recipe_ingredients_snapshot.len(), 1);
        assert!(saved.recipes_data.iter().any(|r| id_of(r) == id_recipe));

        let outcome = handle_recipe_delete(&state, &user, RecipeDelete { id: id_recipe }).await;
        assert!(outcome.is_success(), "{}", outcome.message());
        let deleted = outcome.into_data().unwrap();
        assert!(deleted.recipes_data.iter().all(|r| id_of(r) != id_recipe));

        let outcome = handle_recipe_delete(&state, &user, RecipeDelete { id: id_recipe }).await;
        assert_eq!(outcome.kind(), Some(ErrorKind::NoChange));
    }
}
