//! Reconciliation of a child collection against a submitted end state.
//!
//! Runs entirely on the caller's transaction: read the parent scope, reject
//! stale submissions, diff, apply deletes then updates then inserts, and read
//! the scope back. Any failure rolls the whole sequence back.

use super::query;
use crate::error::Result;
use larder_engine::{
    check_stale, ChildCollection, Diff, DiffCounts, FilterExpression, FilterValue, Record, Source,
    TableDescriptor, Timestamp,
};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgConnection;
use std::collections::BTreeSet;

/// What the caller wants one parent's children to look like.
#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    /// Value of the parent column shared by every child row.
    pub parent: Value,
    /// Desired rows. Rows without a merge key are new.
    pub candidate: Vec<Record>,
    /// When the caller last read the rows it is submitting against.
    pub reference: Timestamp,
}

/// Stored state after reconciling, with what was applied.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub rows: Vec<Record>,
    pub counts: DiffCounts,
    pub skipped: usize,
}

/// Reconcile `collection` under `request.parent` to the submitted rows.
pub async fn reconcile(
    conn: &mut PgConnection,
    collection: &ChildCollection,
    request: ReconcileRequest,
    caller: &str,
    now: Timestamp,
) -> Result<ReconcileReport> {
    let descriptor = collection.descriptor;
    let source = Source::Table {
        descriptor,
        predicate: collection.scope(&request.parent)?.build(descriptor)?,
        order_by: Vec::new(),
    };

    let snapshot = query::select(conn, &source, caller).await?;
    check_stale(descriptor, &snapshot, request.reference)?;

    let mut candidate = request.candidate;
    for row in &mut candidate {
        row.retain_columns(descriptor);
    }
    collection.adopt(&mut candidate, &request.parent);

    let diff = collection
        .reconciler()?
        .owned_by(caller)
        .diff(&snapshot, &candidate)?;
    let counts = diff.counts();
    let skipped = diff.skipped;

    apply(conn, descriptor, diff, caller, now).await?;

    let rows = query::select(conn, &source, caller).await?;
    tracing::info!(
        table = descriptor.name,
        parent = %request.parent,
        inserted = counts.inserted,
        updated = counts.updated,
        deleted = counts.deleted,
        skipped,
        "Reconciled child rows"
    );

    Ok(ReconcileReport {
        rows,
        counts,
        skipped,
    })
}

async fn apply(
    conn: &mut PgConnection,
    descriptor: &'static TableDescriptor,
    diff: Diff,
    caller: &str,
    now: Timestamp,
) -> Result<()> {
    let table = descriptor.table;
    let Diff {
        to_insert,
        mut to_update,
        to_delete,
        ..
    } = diff;

    for filter in delete_filters(descriptor, &to_delete) {
        query::delete(conn, table, &filter.build(descriptor)?).await?;
    }

    if !to_update.is_empty() {
        for row in &mut to_update {
            row.stamp_update(descriptor, caller, now);
        }
        query::update(conn, table, &to_update).await?;
    }

    let inserts: Vec<Record> = to_insert
        .into_iter()
        .map(|mut row| {
            row.drop_generated_keys(descriptor);
            row.stamp_insert(descriptor, caller, now);
            row
        })
        .collect();
    for batch in uniform_batches(inserts) {
        query::insert(conn, table, &batch).await?;
    }

    Ok(())
}

/// One filter for a single-column key, one per row for composite keys.
fn delete_filters(descriptor: &TableDescriptor, rows: &[Record]) -> Vec<FilterExpression> {
    let key_values = |row: &Record, column: &str| row.get(column).and_then(FilterValue::from_json);

    match descriptor.primary_key {
        [] => Vec::new(),
        _ if rows.is_empty() => Vec::new(),
        [column] => {
            let values: Vec<FilterValue> =
                rows.iter().filter_map(|r| key_values(r, *column)).collect();
            vec![FilterExpression::new().and_in(*column, values)]
        }
        columns => rows
            .iter()
            .map(|row| {
                columns.iter().fold(FilterExpression::new(), |filter, column| {
                    filter.and_in(*column, key_values(row, *column))
                })
            })
            .collect(),
    }
}

/// Split rows into consecutive runs that share one field set.
fn uniform_batches(rows: Vec<Record>) -> Vec<Vec<Record>> {
    let mut batches: Vec<Vec<Record>> = Vec::new();
    for row in rows {
        let fields: BTreeSet<String> = row.field_names().map(str::to_string).collect();
        match batches.last_mut() {
            Some(batch)
                if batch[0].field_names().map(str::to_string).collect::<BTreeSet<_>>()
                    == fields =>
            {
                batch.push(row)
            }
            _ => batches.push(vec![row]),
        }
    }
    batches
}
