//! Pre-built read statements.
//!
//! A projection is a fixed query with joins or computed columns that a plain
//! table select cannot express. The set is closed; requests name one by tag
//! and supply its parameters.

use crate::statement::{Bind, Binder, Statement};
use crate::table::SYSTEM_OWNER;
use serde::{Deserialize, Serialize};

/// One of the named joined views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Projection {
    /// Units with the creator's display name, optionally of one unit type.
    UnitsView {
        #[serde(default)]
        unit_type: Option<String>,
    },
    /// Skills with creator and modifier display names.
    SkillsView,
    /// Resources with creator and modifier display names.
    ResourcesView,
    /// Tasks with their unit's name.
    TasksView,
    /// Every ingredient visible to the caller, with the recipe's line for it
    /// when there is one. Lines come first.
    RecipeCompositionLoaded { id_recipe: i64 },
    /// Only the recipe's lines owned by the caller.
    RecipeCompositionSnapshot { id_recipe: i64 },
    /// Every ingredient visible to the caller, with no line columns filled.
    RecipeCompositionEmpty,
}

impl Projection {
    /// Name used in outcome messages.
    pub fn label(&self) -> &'static str {
        match self {
            Projection::UnitsView { .. } => "Units",
            Projection::SkillsView => "Skills",
            Projection::ResourcesView => "Resources",
            Projection::TasksView => "Tasks",
            Projection::RecipeCompositionLoaded { .. }
            | Projection::RecipeCompositionSnapshot { .. }
            | Projection::RecipeCompositionEmpty => "Recipe ingredients",
        }
    }

    /// Render for `caller`, whose identity scopes the recipe views.
    pub fn statement(&self, caller: &str) -> Statement {
        let mut binder = Binder::default();
        let body = match self {
            Projection::UnitsView { unit_type } => {
                let system = binder.push(Bind::Text(SYSTEM_OWNER.to_string()));
                let mut sql = format!(
                    "SELECT u.id, u.name, u.abbreviation, u.type, \
                     CASE WHEN u.created_by = {system} THEN u.created_by \
                     ELSE creator.name END AS created_by \
                     FROM units AS u \
                     LEFT JOIN users AS creator ON creator.google_id = u.created_by"
                );
                if let Some(unit_type) = unit_type {
                    let slot = binder.push(Bind::Text(unit_type.clone()));
                    sql.push_str(&format!(" WHERE u.type = {slot}"));
                }
                sql.push_str(" ORDER BY u.name, u.id");
                sql
            }
            Projection::SkillsView => audited_view("skills", "s.id, s.name, s.description"),
            Projection::ResourcesView => audited_view("resources", "s.id, s.name"),
            Projection::TasksView => "SELECT k.id, k.name, k.description, k.duration, k.id_unit, \
                 u.name AS unit, k.interruptible, k.error_margin \
                 FROM tasks AS k LEFT JOIN units AS u ON u.id = k.id_unit \
                 ORDER BY k.name, k.id"
                .to_string(),
            Projection::RecipeCompositionLoaded { id_recipe } => {
                let recipe = binder.push(Bind::Int(*id_recipe));
                let caller = binder.push(Bind::Text(caller.to_string()));
                let system = binder.push(Bind::Text(SYSTEM_OWNER.to_string()));
                format!(
                    "{COMPOSITION_COLUMNS} FROM ingredients AS i \
                     LEFT JOIN recipe_ingredients AS ri \
                     ON ri.id_ingredient = i.id AND ri.id_recipe = {recipe} \
                     AND ri.created_by = {caller} \
                     LEFT JOIN units AS u ON u.id = ri.id_unit \
                     WHERE i.created_by IN ({caller}, {system}) \
                     ORDER BY ri.id IS NULL, i.name, i.id"
                )
            }
            Projection::RecipeCompositionSnapshot { id_recipe } => {
                let recipe = binder.push(Bind::Int(*id_recipe));
                let caller = binder.push(Bind::Text(caller.to_string()));
                format!(
                    "{COMPOSITION_COLUMNS} FROM recipe_ingredients AS ri \
                     JOIN ingredients AS i ON i.id = ri.id_ingredient \
                     LEFT JOIN units AS u ON u.id = ri.id_unit \
                     WHERE ri.id_recipe = {recipe} AND ri.created_by = {caller} \
                     ORDER BY ri.id"
                )
            }
            Projection::RecipeCompositionEmpty => {
                let caller = binder.push(Bind::Text(caller.to_string()));
                let system = binder.push(Bind::Text(SYSTEM_OWNER.to_string()));
                format!(
                    "SELECT NULL::bigint AS id_recipe_ingredient, i.id AS id_ingredient, \
                     i.name, i.type, NULL::double precision AS quantity, \
                     NULL::bigint AS id_unit, NULL::text AS unit, \
                     NULL::text AS created_by, NULL::timestamp AS updated_at \
                     FROM ingredients AS i \
                     WHERE i.created_by IN ({caller}, {system}) \
                     ORDER BY i.name, i.id"
                )
            }
        };

        Statement::new(
            format!("SELECT row_to_json(p) FROM ({body}) AS p"),
            binder,
        )
    }
}

const COMPOSITION_COLUMNS: &str = "SELECT ri.id AS id_recipe_ingredient, \
     i.id AS id_ingredient, i.name, i.type, ri.quantity, ri.id_unit, \
     u.name AS unit, ri.created_by, ri.updated_at";

fn audited_view(table: &str, columns: &str) -> String {
    format!(
        "SELECT {columns}, creator.name AS created_by, s.created_at, \
         modifier.name AS updated_by, s.updated_at \
         FROM {table} AS s \
         LEFT JOIN users AS creator ON creator.google_id = s.created_by \
         LEFT JOIN users AS modifier ON modifier.google_id = s.updated_by \
         ORDER BY s.name, s.id"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_by_name() {
        let p: Projection = serde_json::from_value(json!({"name": "tasks_view"})).unwrap();
        assert_eq!(p, Projection::TasksView);

        let p: Projection =
            serde_json::from_value(json!({"name": "units_view", "unit_type": "mass"})).unwrap();
        assert_eq!(
            p,
            Projection::UnitsView {
                unit_type: Some("mass".into())
            }
        );

        let p: Projection = serde_json::from_value(json!({"name": "units_view"})).unwrap();
        assert_eq!(p, Projection::UnitsView { unit_type: None });

        assert!(serde_json::from_value::<Projection>(json!({"name": "secrets"})).is_err());
    }

    #[test]
    fn every_view_yields_json_rows() {
        let all = [
            Projection::UnitsView { unit_type: None },
            Projection::SkillsView,
            Projection::ResourcesView,
            Projection::TasksView,
            Projection::RecipeCompositionLoaded { id_recipe: 1 },
            Projection::RecipeCompositionSnapshot { id_recipe: 1 },
            Projection::RecipeCompositionEmpty,
        ];
        for projection in all {
            let stmt = projection.statement("1001");
            assert!(stmt.sql.starts_with("SELECT row_to_json(p) FROM (SELECT "));
            assert!(stmt.sql.ends_with(") AS p"));
        }
    }

    #[test]
    fn units_view_masks_system_creator_and_filters_type() {
        let stmt = Projection::UnitsView {
            unit_type: Some("mass".into()),
        }
        .statement("1001");
        assert!(stmt.sql.contains("WHEN u.created_by = $1 THEN u.created_by"));
        assert!(stmt.sql.contains("WHERE u.type = $2"));
        assert_eq!(
            stmt.binds,
            vec![Bind::Text("system".into()), Bind::Text("mass".into())]
        );
    }

    #[test]
    fn recipe_views_are_scoped_to_caller() {
        let stmt = Projection::RecipeCompositionSnapshot { id_recipe: 42 }.statement("1001");
        assert!(stmt.sql.contains("ri.id_recipe = $1 AND ri.created_by = $2"));
        assert_eq!(
            stmt.binds,
            vec![Bind::Int(42), Bind::Text("1001".into())]
        );

        let stmt = Projection::RecipeCompositionLoaded { id_recipe: 42 }.statement("1001");
        assert!(stmt.sql.contains("i.created_by IN ($2, $3)"));
        assert_eq!(stmt.binds.len(), 3);
    }

    #[test]
    fn labels() {
        assert_eq!(Projection::SkillsView.label(), "Skills");
        assert_eq!(Projection::RecipeCompositionEmpty.label(), "Recipe ingredients");
    }
}
