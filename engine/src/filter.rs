//! Composable filter expressions.
//!
//! A [`FilterExpression`] holds four condition groups, each a mapping from
//! column name to a list of values:
//!
//! | Group      | Per column            | Across columns |
//! |------------|-----------------------|----------------|
//! | `and_`     | value ∈ list          | AND            |
//! | `or_`      | value ∈ list          | OR             |
//! | `like_`    | matches any pattern   | OR             |
//! | `not_like_`| matches no pattern    | AND            |
//!
//! Non-empty groups are ANDed together. An expression with every group empty
//! matches all rows. [`FilterExpression::build`] checks every column against a
//! table and produces an opaque [`Predicate`], the only form the statement
//! builder accepts.
//!
//! Membership values are checked against the column type and compared in that
//! type, so `7` and `"7"` match the same key and a timestamp matches whether it
//! is sent with a `T` or a space. Patterns always match the column's text form.

use crate::clock::{format_timestamp, parse_timestamp};
use crate::error::Result;
use crate::statement::{Bind, Binder};
use crate::table::{ColumnDef, ColumnType, Table, TableDescriptor};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A scalar filter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl FilterValue {
    /// Text form, as Postgres renders the value with `::text`.
    pub fn to_text(&self) -> String {
        match self {
            FilterValue::Int(i) => i.to_string(),
            FilterValue::Float(f) => f.to_string(),
            FilterValue::Bool(b) => b.to_string(),
            FilterValue::Text(s) => s.clone(),
        }
    }

    /// Convert a JSON scalar. Arrays, objects and null have no filter form.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(FilterValue::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(FilterValue::Int)
                .or_else(|| n.as_f64().map(FilterValue::Float)),
            serde_json::Value::String(s) => Some(FilterValue::Text(s.clone())),
            _ => None,
        }
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Int(v)
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        FilterValue::Int(v.into())
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        FilterValue::Float(v)
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        FilterValue::Bool(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Text(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::Text(v)
    }
}

/// Column name → values, kept sorted so rendered SQL is deterministic.
pub type Conditions = BTreeMap<String, Vec<FilterValue>>;

/// Declarative WHERE clause over one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterExpression {
    #[serde(default, rename = "and_", alias = "and")]
    pub and: Conditions,
    #[serde(default, rename = "or_", alias = "or")]
    pub or: Conditions,
    #[serde(default, rename = "like_", alias = "like")]
    pub like: Conditions,
    #[serde(default, rename = "not_like_", alias = "not_like")]
    pub not_like: Conditions,
}

impl FilterExpression {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `column` ∈ `values`.
    pub fn and_in<V: Into<FilterValue>>(
        mut self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        extend(&mut self.and, column, values);
        self
    }

    /// Allow rows where `column` ∈ `values`, ORed with other `or_` columns.
    pub fn or_in<V: Into<FilterValue>>(
        mut self,
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        extend(&mut self.or, column, values);
        self
    }

    pub fn like(mut self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        extend(&mut self.like, column, [FilterValue::Text(pattern.into())]);
        self
    }

    pub fn not_like(mut self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        extend(&mut self.not_like, column, [FilterValue::Text(pattern.into())]);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.and.is_empty()
            && self.or.is_empty()
            && self.like.is_empty()
            && self.not_like.is_empty()
    }

    /// Every column named by any group.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        [&self.and, &self.or, &self.like, &self.not_like]
            .into_iter()
            .flat_map(|group| group.keys().map(String::as_str))
    }

    /// Validate against a table and produce its executable predicate.
    pub fn build(&self, descriptor: &TableDescriptor) -> Result<Predicate> {
        let mut groups = Vec::new();

        let and = membership(descriptor, &self.and)?;
        if !and.is_empty() {
            groups.push(Group::AllIn(and));
        }

        let or = membership(descriptor, &self.or)?;
        if !or.is_empty() {
            groups.push(Group::AnyIn(or));
        }

        let like = patterns(descriptor, &self.like)?;
        if !like.is_empty() {
            groups.push(Group::AnyLike(like));
        }

        let not_like = patterns(descriptor, &self.not_like)?;
        if !not_like.is_empty() {
            groups.push(Group::NoneLike(not_like));
        }

        Ok(Predicate {
            table: descriptor.table,
            groups,
        })
    }
}

fn extend<V: Into<FilterValue>>(
    conditions: &mut Conditions,
    column: impl Into<String>,
    values: impl IntoIterator<Item = V>,
) {
    conditions
        .entry(column.into())
        .or_default()
        .extend(values.into_iter().map(Into::into));
}

fn membership(descriptor: &TableDescriptor, conditions: &Conditions) -> Result<Vec<Membership>> {
    conditions
        .iter()
        .map(|(column, values)| {
            let column = descriptor.require_column(column)?;
            Ok(Membership {
                column: column.name,
                column_type: column.column_type,
                values: values
                    .iter()
                    .map(|v| typed_text(column, v))
                    .collect::<Result<_>>()?,
            })
        })
        .collect()
}

/// Text a value is bound as, in a form Postgres casts to the column type.
fn typed_text(column: &ColumnDef, value: &FilterValue) -> Result<String> {
    fn reparse<T: std::str::FromStr + ToString>(s: &str) -> Option<String> {
        s.trim().parse::<T>().ok().map(|v| v.to_string())
    }

    let text = match (column.column_type, value) {
        (ColumnType::Text, v) => Some(v.to_text()),
        (ColumnType::Int, FilterValue::Int(i)) => Some(i.to_string()),
        (ColumnType::Int, FilterValue::Text(s)) => reparse::<i64>(s),
        (ColumnType::Float, FilterValue::Int(_) | FilterValue::Float(_)) => Some(value.to_text()),
        (ColumnType::Float, FilterValue::Text(s)) => reparse::<f64>(s),
        (ColumnType::Bool, FilterValue::Bool(b)) => Some(b.to_string()),
        (ColumnType::Bool, FilterValue::Text(s)) => reparse::<bool>(s),
        (ColumnType::Timestamp, FilterValue::Text(s)) => {
            parse_timestamp(s).ok().map(format_timestamp)
        }
        _ => None,
    };

    text.ok_or_else(|| Error::TypeMismatch {
        column: column.name.to_string(),
        expected: column.column_type.to_string(),
        got: value.to_text(),
    })
}

fn patterns(
    descriptor: &TableDescriptor,
    conditions: &Conditions,
) -> Result<Vec<(&'static str, String)>> {
    let mut out = Vec::new();
    for (column, values) in conditions {
        let column = descriptor.require_column(column)?.name;
        out.extend(values.iter().map(|v| (column, v.to_text())));
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq)]
struct Membership {
    column: &'static str,
    column_type: ColumnType,
    values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum Group {
    AllIn(Vec<Membership>),
    AnyIn(Vec<Membership>),
    AnyLike(Vec<(&'static str, String)>),
    NoneLike(Vec<(&'static str, String)>),
}

/// Executable form of a [`FilterExpression`], bound to one table.
///
/// Column names inside a predicate always come from the table catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    table: Table,
    groups: Vec<Group>,
}

impl Predicate {
    /// The predicate that matches every row of `table`.
    pub fn match_all(table: Table) -> Self {
        Self {
            table,
            groups: Vec::new(),
        }
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub fn is_match_all(&self) -> bool {
        self.groups.is_empty()
    }

    /// Narrow to rows whose owner column is one of `owners`.
    ///
    /// The restriction is ANDed with everything already in the predicate, so
    /// a filter on the owner column can only narrow it further. Tables
    /// without an owner column are left as they are.
    pub fn restrict_owners<S: AsRef<str>>(mut self, owners: &[S]) -> Self {
        if let Some(owner) = self.table.descriptor().owner {
            self.groups.push(Group::AllIn(vec![Membership {
                column: owner,
                column_type: ColumnType::Text,
                values: owners.iter().map(|o| o.as_ref().to_string()).collect(),
            }]));
        }
        self
    }

    /// Render as a SQL condition over `alias`, or `None` for match-all.
    pub(crate) fn render(&self, alias: &str, binder: &mut Binder) -> Option<String> {
        if self.groups.is_empty() {
            return None;
        }

        let rendered: Vec<String> = self
            .groups
            .iter()
            .map(|group| {
                let inner = match group {
                    Group::AllIn(cols) => join_membership(alias, cols, binder, " AND "),
                    Group::AnyIn(cols) => join_membership(alias, cols, binder, " OR "),
                    Group::AnyLike(pats) => pats
                        .iter()
                        .map(|(c, p)| {
                            let slot = binder.push(Bind::Text(p.clone()));
                            format!("{alias}.\"{c}\"::text LIKE {slot}")
                        })
                        .collect::<Vec<_>>()
                        .join(" OR "),
                    // NULL never matches a pattern, so it counts as a mismatch.
                    Group::NoneLike(pats) => pats
                        .iter()
                        .map(|(c, p)| {
                            let slot = binder.push(Bind::Text(p.clone()));
                            format!("({alias}.\"{c}\"::text LIKE {slot}) IS NOT TRUE")
                        })
                        .collect::<Vec<_>>()
                        .join(" AND "),
                };
                format!("({inner})")
            })
            .collect();

        Some(rendered.join(" AND "))
    }
}

fn join_membership(
    alias: &str,
    cols: &[Membership],
    binder: &mut Binder,
    separator: &str,
) -> String {
    cols.iter()
        .map(|m| {
            let slot = binder.push(Bind::TextArray(m.values.clone()));
            let c = m.column;
            match m.column_type {
                ColumnType::Text => format!("{alias}.\"{c}\" = ANY({slot})"),
                other => format!("{alias}.\"{c}\" = ANY({slot}::{}[])", other.sql_type()),
            }
        })
        .collect::<Vec<_>>()
        .join(separator)
}
