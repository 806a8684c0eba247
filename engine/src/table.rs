//! Table catalog.
//!
//! Every persisted table is a variant of the closed [`Table`] enum. Each
//! variant resolves to a static [`TableDescriptor`] carrying its ordered
//! columns, primary key and owner policy, so column names used by filters and
//! diffs are checked against a fixed contract instead of a runtime registry.

use crate::{error::Result, Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Owner value marking rows that belong to the system and must never be deleted.
pub const SYSTEM_OWNER: &str = "system";

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";
pub const CREATED_BY: &str = "created_by";
pub const UPDATED_BY: &str = "updated_by";

/// Column types, as far as request validation needs to know them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Int,
    Float,
    Text,
    Bool,
    Timestamp,
}

impl ColumnType {
    /// Postgres type name used when casting bound text.
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Int => "bigint",
            ColumnType::Float => "double precision",
            ColumnType::Text => "text",
            ColumnType::Bool => "boolean",
            ColumnType::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Int => write!(f, "Int"),
            ColumnType::Float => write!(f, "Float"),
            ColumnType::Text => write!(f, "Text"),
            ColumnType::Bool => write!(f, "Bool"),
            ColumnType::Timestamp => write!(f, "Timestamp"),
        }
    }
}

/// A single column of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub column_type: ColumnType,
}

impl ColumnDef {
    const fn new(name: &'static str, column_type: ColumnType) -> Self {
        Self { name, column_type }
    }

    /// Check a JSON value against this column's type. `null` is always
    /// accepted here; nullability is enforced by the store.
    pub fn validate(&self, value: &serde_json::Value) -> Result<()> {
        use serde_json::Value;

        let valid = match (self.column_type, value) {
            (_, Value::Null) => true,
            (ColumnType::Int, Value::Number(n)) => n.is_i64() || n.is_u64(),
            // Keys often travel as strings from form inputs.
            (ColumnType::Int, Value::String(s)) => s.trim().parse::<i64>().is_ok(),
            (ColumnType::Float, Value::Number(_)) => true,
            (ColumnType::Text, Value::String(_)) => true,
            (ColumnType::Bool, Value::Bool(_)) => true,
            (ColumnType::Timestamp, Value::String(_)) => true,
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                column: self.name.to_string(),
                expected: self.column_type.to_string(),
                got: json_type_name(value).to_string(),
            })
        }
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "Null",
        serde_json::Value::Bool(_) => "Bool",
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => "Int",
        serde_json::Value::Number(_) => "Float",
        serde_json::Value::String(_) => "String",
        serde_json::Value::Array(_) => "Array",
        serde_json::Value::Object(_) => "Object",
    }
}

/// Static description of one table.
#[derive(Debug, PartialEq, Eq)]
pub struct TableDescriptor {
    pub table: Table,
    pub name: &'static str,
    /// Columns in their declared order.
    pub columns: &'static [ColumnDef],
    pub primary_key: &'static [&'static str],
    /// Whether the primary key is assigned by the database.
    pub generated_key: bool,
    /// Column holding the owning user, if the table is owned at all.
    pub owner: Option<&'static str>,
}

impl TableDescriptor {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Look up a column, failing with a validation error when it is unknown.
    pub fn require_column(&self, name: &str) -> Result<&ColumnDef> {
        self.column(name).ok_or_else(|| Error::UnknownColumn {
            table: self.name.to_string(),
            column: name.to_string(),
        })
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn is_primary_key(&self, name: &str) -> bool {
        self.primary_key.contains(&name)
    }

    /// Validate every field of a record: known column, compatible type.
    pub fn validate_fields<'a>(
        &self,
        fields: impl IntoIterator<Item = (&'a String, &'a serde_json::Value)>,
    ) -> Result<()> {
        for (name, value) in fields {
            self.require_column(name)?.validate(value)?;
        }
        Ok(())
    }
}

impl fmt::Display for TableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Every table the service persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Users,
    Units,
    Categories,
    Ingredients,
    Recipes,
    RecipeIngredients,
    Skills,
    Resources,
    Tasks,
    TaskSkills,
    ResourceSkills,
}

impl Table {
    pub const ALL: [Table; 11] = [
        Table::Users,
        Table::Units,
        Table::Categories,
        Table::Ingredients,
        Table::Recipes,
        Table::RecipeIngredients,
        Table::Skills,
        Table::Resources,
        Table::Tasks,
        Table::TaskSkills,
        Table::ResourceSkills,
    ];

    pub fn descriptor(self) -> &'static TableDescriptor {
        match self {
            Table::Users => &USERS,
            Table::Units => &UNITS,
            Table::Categories => &CATEGORIES,
            Table::Ingredients => &INGREDIENTS,
            Table::Recipes => &RECIPES,
            Table::RecipeIngredients => &RECIPE_INGREDIENTS,
            Table::Skills => &SKILLS,
            Table::Resources => &RESOURCES,
            Table::Tasks => &TASKS,
            Table::TaskSkills => &TASK_SKILLS,
            Table::ResourceSkills => &RESOURCE_SKILLS,
        }
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    /// Human-readable label for messages ("Recipe ingredients").
    pub fn label(self) -> &'static str {
        match self {
            Table::Users => "Users",
            Table::Units => "Units",
            Table::Categories => "Categories",
            Table::Ingredients => "Ingredients",
            Table::Recipes => "Recipes",
            Table::RecipeIngredients => "Recipe ingredients",
            Table::Skills => "Skills",
            Table::Resources => "Resources",
            Table::Tasks => "Tasks",
            Table::TaskSkills => "Task skills",
            Table::ResourceSkills => "Resource skills",
        }
    }
}

impl FromStr for Table {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Table::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| Error::UnknownTable(s.to_string()))
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

use ColumnType::{Bool, Float, Int, Text, Timestamp};

macro_rules! audited {
    ($($col:expr),* $(,)?) => {
        &[
            $($col,)*
            ColumnDef::new(CREATED_BY, Text),
            ColumnDef::new(UPDATED_BY, Text),
            ColumnDef::new(CREATED_AT, Timestamp),
            ColumnDef::new(UPDATED_AT, Timestamp),
        ]
    };
}

static USERS: TableDescriptor = TableDescriptor {
    table: Table::Users,
    name: "users",
    columns: &[
        ColumnDef::new("google_id", Text),
        ColumnDef::new("google_email", Text),
        ColumnDef::new("google_picture_url", Text),
        ColumnDef::new("name", Text),
        ColumnDef::new("locale", Text),
        ColumnDef::new(CREATED_AT, Timestamp),
        ColumnDef::new(UPDATED_AT, Timestamp),
    ],
    primary_key: &["google_id"],
    generated_key: false,
    owner: None,
};

static UNITS: TableDescriptor = TableDescriptor {
    table: Table::Units,
    name: "units",
    columns: audited![
        ColumnDef::new("id", Int),
        ColumnDef::new("name", Text),
        ColumnDef::new("abbreviation", Text),
        ColumnDef::new("type", Text),
    ],
    primary_key: &["id"],
    generated_key: true,
    owner: Some(CREATED_BY),
};

static CATEGORIES: TableDescriptor = TableDescriptor {
    table: Table::Categories,
    name: "categories",
    columns: audited![
        ColumnDef::new("id", Int),
        ColumnDef::new("name", Text),
        ColumnDef::new("description", Text),
        ColumnDef::new("type", Text),
    ],
    primary_key: &["id"],
    generated_key: true,
    owner: Some(CREATED_BY),
};

static INGREDIENTS: TableDescriptor = TableDescriptor {
    table: Table::Ingredients,
    name: "ingredients",
    columns: audited![
        ColumnDef::new("id", Int),
        ColumnDef::new("name", Text),
        ColumnDef::new("description", Text),
        ColumnDef::new("type", Text),
    ],
    primary_key: &["id"],
    generated_key: true,
    owner: Some(CREATED_BY),
};

static RECIPES: TableDescriptor = TableDescriptor {
    table: Table::Recipes,
    name: "recipes",
    columns: audited![
        ColumnDef::new("id", Int),
        ColumnDef::new("name", Text),
        ColumnDef::new("description", Text),
        ColumnDef::new("timing", Text),
        ColumnDef::new("type", Text),
        ColumnDef::new("course", Text),
    ],
    primary_key: &["id"],
    generated_key: true,
    owner: Some(CREATED_BY),
};

static RECIPE_INGREDIENTS: TableDescriptor = TableDescriptor {
    table: Table::RecipeIngredients,
    name: "recipe_ingredients",
    columns: audited![
        ColumnDef::new("id", Int),
        ColumnDef::new("id_recipe", Int),
        ColumnDef::new("id_ingredient", Int),
        ColumnDef::new("quantity", Float),
        ColumnDef::new("id_unit", Int),
    ],
    primary_key: &["id"],
    generated_key: true,
    owner: Some(CREATED_BY),
};

static SKILLS: TableDescriptor = TableDescriptor {
    table: Table::Skills,
    name: "skills",
    columns: audited![
        ColumnDef::new("id", Int),
        ColumnDef::new("name", Text),
        ColumnDef::new("description", Text),
    ],
    primary_key: &["id"],
    generated_key: true,
    owner: Some(CREATED_BY),
};

static RESOURCES: TableDescriptor = TableDescriptor {
    table: Table::Resources,
    name: "resources",
    columns: audited![ColumnDef::new("id", Int), ColumnDef::new("name", Text)],
    primary_key: &["id"],
    generated_key: true,
    owner: Some(CREATED_BY),
};

static TASKS: TableDescriptor = TableDescriptor {
    table: Table::Tasks,
    name: "tasks",
    columns: audited![
        ColumnDef::new("id", Int),
        ColumnDef::new("name", Text),
        ColumnDef::new("description", Text),
        ColumnDef::new("duration", Float),
        ColumnDef::new("id_unit", Int),
        ColumnDef::new("interruptible", Bool),
        ColumnDef::new("error_margin", Float),
    ],
    primary_key: &["id"],
    generated_key: true,
    owner: Some(CREATED_BY),
};

static TASK_SKILLS: TableDescriptor = TableDescriptor {
    table: Table::TaskSkills,
    name: "task_skills",
    columns: &[
        ColumnDef::new("id_task", Int),
        ColumnDef::new("id_skill", Int),
    ],
    primary_key: &["id_task", "id_skill"],
    generated_key: false,
    owner: None,
};

static RESOURCE_SKILLS: TableDescriptor = TableDescriptor {
    table: Table::ResourceSkills,
    name: "resource_skills",
    columns: &[
        ColumnDef::new("id_resource", Int),
        ColumnDef::new("id_skill", Int),
    ],
    primary_key: &["id_resource", "id_skill"],
    generated_key: false,
    owner: None,
};
