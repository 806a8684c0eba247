//! Parameterized Postgres statements.
//!
//! Builders here validate their input against a [`TableDescriptor`] and render
//! SQL text plus ordered bind values. Nothing is executed. Every statement
//! yields rows as single `json` values (`row_to_json`), so the caller decodes
//! one column regardless of table shape.
//!
//! Record values travel as one `jsonb` parameter and are converted to column
//! types by `jsonb_populate_record(set)` against the table's own row type.

use crate::error::Result;
use crate::filter::Predicate;
use crate::record::Record;
use crate::table::{TableDescriptor, CREATED_AT, CREATED_BY, SYSTEM_OWNER};
use crate::Error;
use serde_json::Value;
use std::collections::BTreeSet;

const ALIAS: &str = "t";

/// A bind parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Bind {
    Int(i64),
    Text(String),
    TextArray(Vec<String>),
    Json(Value),
}

/// Collects bind values and hands out their `$n` placeholders.
#[derive(Debug, Default)]
pub(crate) struct Binder {
    binds: Vec<Bind>,
}

impl Binder {
    pub(crate) fn push(&mut self, bind: Bind) -> String {
        self.binds.push(bind);
        format!("${}", self.binds.len())
    }

    pub(crate) fn into_binds(self) -> Vec<Bind> {
        self.binds
    }
}

/// SQL text with its bind values, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub binds: Vec<Bind>,
}

impl Statement {
    pub(crate) fn new(sql: String, binder: Binder) -> Self {
        Self {
            sql,
            binds: binder.into_binds(),
        }
    }
}

fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn qualified(column: &str) -> String {
    format!("{ALIAS}.{}", ident(column))
}

fn column_list(columns: &[&str]) -> String {
    columns.iter().map(|c| ident(c)).collect::<Vec<_>>().join(", ")
}

fn ensure_table(descriptor: &TableDescriptor, predicate: &Predicate) -> Result<()> {
    if predicate.table() == descriptor.table {
        Ok(())
    } else {
        Err(Error::invalid(format!(
            "predicate built for '{}' used on '{}'",
            predicate.table(),
            descriptor.name
        )))
    }
}

/// Fields of `record` that are table columns, in declared column order.
fn ordered_fields(descriptor: &TableDescriptor, record: &Record) -> Result<Vec<&'static str>> {
    descriptor.validate_fields(record.fields())?;
    Ok(descriptor
        .columns
        .iter()
        .map(|c| c.name)
        .filter(|name| record.contains(name))
        .collect())
}

fn wrap_returning(cte: &str, body: String) -> String {
    format!("WITH {cte} AS ({body} RETURNING {ALIAS}.*) SELECT row_to_json({cte}) FROM {cte}")
}

/// `SELECT` rows of a table, ascending by `order_by` with the primary key as
/// final tie-breaker.
pub fn select(
    descriptor: &TableDescriptor,
    predicate: &Predicate,
    order_by: &[String],
) -> Result<Statement> {
    ensure_table(descriptor, predicate)?;

    let mut ordering: Vec<&'static str> = Vec::new();
    for column in order_by {
        let name = descriptor.require_column(column)?.name;
        if !ordering.contains(&name) {
            ordering.push(name);
        }
    }
    for key in descriptor.primary_key {
        if !ordering.contains(key) {
            ordering.push(key);
        }
    }

    let mut binder = Binder::default();
    let mut sql = format!(
        "SELECT row_to_json({ALIAS}) FROM {} AS {ALIAS}",
        ident(descriptor.name)
    );
    if let Some(condition) = predicate.render(ALIAS, &mut binder) {
        sql.push_str(" WHERE ");
        sql.push_str(&condition);
    }
    sql.push_str(" ORDER BY ");
    sql.push_str(
        &ordering
            .iter()
            .map(|c| qualified(c))
            .collect::<Vec<_>>()
            .join(", "),
    );

    Ok(Statement::new(sql, binder))
}

/// Count rows matched by `predicate` that belong to the system owner.
///
/// `None` when the table has no owner column and nothing can be protected.
pub fn protected_count(
    descriptor: &TableDescriptor,
    predicate: &Predicate,
) -> Result<Option<Statement>> {
    ensure_table(descriptor, predicate)?;
    let Some(owner) = descriptor.owner else {
        return Ok(None);
    };

    let mut binder = Binder::default();
    let mut conditions = Vec::new();
    if let Some(condition) = predicate.render(ALIAS, &mut binder) {
        conditions.push(condition);
    }
    let slot = binder.push(Bind::Text(SYSTEM_OWNER.to_string()));
    conditions.push(format!("{} = {slot}", qualified(owner)));

    let sql = format!(
        "SELECT COUNT(*) FROM {} AS {ALIAS} WHERE {}",
        ident(descriptor.name),
        conditions.join(" AND ")
    );
    Ok(Some(Statement::new(sql, binder)))
}

/// Batched `INSERT` of records sharing one field set.
pub fn insert(descriptor: &TableDescriptor, records: &[Record]) -> Result<Statement> {
    let Some(first) = records.first() else {
        return Err(Error::NoChange(format!(
            "nothing to insert into '{}'",
            descriptor.name
        )));
    };

    let columns = ordered_fields(descriptor, first)?;
    if columns.is_empty() {
        return Err(Error::invalid(format!(
            "records inserted into '{}' have no fields",
            descriptor.name
        )));
    }
    let expected: BTreeSet<&str> = first.field_names().collect();

    for record in records {
        descriptor.validate_fields(record.fields())?;
        if descriptor.generated_key {
            if let Some(key) = descriptor.primary_key.iter().find(|k| record.contains(k)) {
                return Err(Error::GeneratedKey {
                    table: descriptor.name.to_string(),
                    column: key.to_string(),
                });
            }
        }
        if record.field_names().collect::<BTreeSet<_>>() != expected {
            return Err(Error::invalid(format!(
                "records inserted into '{}' must share the same fields",
                descriptor.name
            )));
        }
    }

    let mut binder = Binder::default();
    let payload = Value::Array(records.iter().cloned().map(Record::into_value).collect());
    let slot = binder.push(Bind::Json(payload));
    let list = column_list(&columns);

    let body = format!(
        "INSERT INTO {table} AS {ALIAS} ({list}) SELECT {list} \
         FROM jsonb_populate_recordset(NULL::{table}, {slot}::jsonb)",
        table = ident(descriptor.name),
    );
    Ok(Statement::new(wrap_returning("written", body), binder))
}

/// `UPDATE` of one record, keyed by primary-key equality. Creation stamps are
/// never written.
pub fn update(descriptor: &TableDescriptor, record: &Record) -> Result<Statement> {
    record.require_identity(descriptor)?;
    let columns = ordered_fields(descriptor, record)?;

    let assignments: Vec<String> = columns
        .iter()
        .filter(|c| !descriptor.is_primary_key(c) && **c != CREATED_AT && **c != CREATED_BY)
        .map(|c| format!("{} = r.{}", ident(c), ident(c)))
        .collect();
    if assignments.is_empty() {
        return Err(Error::NoChange(format!(
            "update of '{}' carries no fields besides its key",
            descriptor.name
        )));
    }

    let key_match: Vec<String> = descriptor
        .primary_key
        .iter()
        .map(|k| format!("{} = r.{}", qualified(k), ident(k)))
        .collect();

    let mut payload = record.clone();
    payload.strip_creation();

    let mut binder = Binder::default();
    let slot = binder.push(Bind::Json(payload.into_value()));
    let body = format!(
        "UPDATE {table} AS {ALIAS} SET {set} \
         FROM jsonb_populate_record(NULL::{table}, {slot}::jsonb) AS r WHERE {keys}",
        table = ident(descriptor.name),
        set = assignments.join(", "),
        keys = key_match.join(" AND "),
    );
    Ok(Statement::new(wrap_returning("written", body), binder))
}

/// `DELETE` rows matched by `predicate`, never touching system-owned rows.
pub fn delete(descriptor: &TableDescriptor, predicate: &Predicate) -> Result<Statement> {
    ensure_table(descriptor, predicate)?;

    let mut binder = Binder::default();
    let mut conditions = Vec::new();
    if let Some(condition) = predicate.render(ALIAS, &mut binder) {
        conditions.push(condition);
    }
    if let Some(owner) = descriptor.owner {
        let slot = binder.push(Bind::Text(SYSTEM_OWNER.to_string()));
        conditions.push(format!("{} IS DISTINCT FROM {slot}", qualified(owner)));
    }

    let mut body = format!("DELETE FROM {} AS {ALIAS}", ident(descriptor.name));
    if !conditions.is_empty() {
        body.push_str(" WHERE ");
        body.push_str(&conditions.join(" AND "));
    }
    Ok(Statement::new(wrap_returning("removed", body), binder))
}

/// `INSERT .. ON CONFLICT (primary key) DO UPDATE` of one record. Every
/// supplied non-key field replaces the stored value.
pub fn upsert(descriptor: &TableDescriptor, record: &Record) -> Result<Statement> {
    if !descriptor.generated_key {
        record.require_identity(descriptor)?;
    }
    let columns = ordered_fields(descriptor, record)?;
    if columns.is_empty() {
        return Err(Error::invalid(format!(
            "record upserted into '{}' has no fields",
            descriptor.name
        )));
    }

    let assignments: Vec<String> = columns
        .iter()
        .filter(|c| !descriptor.is_primary_key(c))
        .map(|c| format!("{} = EXCLUDED.{}", ident(c), ident(c)))
        .collect();
    let action = if assignments.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", assignments.join(", "))
    };

    let mut binder = Binder::default();
    let slot = binder.push(Bind::Json(record.clone().into_value()));
    let list = column_list(&columns);
    let body = format!(
        "INSERT INTO {table} AS {ALIAS} ({list}) SELECT {list} \
         FROM jsonb_populate_record(NULL::{table}, {slot}::jsonb) \
         ON CONFLICT ({keys}) {action}",
        table = ident(descriptor.name),
        keys = column_list(descriptor.primary_key),
    );
    Ok(Statement::new(wrap_returning("written", body), binder))
}
