//! Query execution against an open transaction.
//!
//! Every function here takes the `&mut PgConnection` of a transaction owned by
//! [`run`](super::run) and executes statements rendered by the engine. Rows
//! come back as JSON objects and are normalized to the table's column order.

use crate::error::Result;
use larder_engine::clock::format_timestamp;
use larder_engine::table::CREATED_AT;
use larder_engine::{
    statement, Bind, Error, Predicate, Record, Source, Statement, Table, TableDescriptor,
    Timestamp,
};
use serde_json::Value;
use sqlx::postgres::PgArguments;
use sqlx::query::QueryScalar;
use sqlx::types::Json;
use sqlx::{PgConnection, Postgres};

fn bind_all<'q, O>(
    mut query: QueryScalar<'q, Postgres, O, PgArguments>,
    binds: &'q [Bind],
) -> QueryScalar<'q, Postgres, O, PgArguments> {
    for bind in binds {
        query = match bind {
            Bind::Int(value) => query.bind(*value),
            Bind::Text(value) => query.bind(value.as_str()),
            Bind::TextArray(values) => query.bind(values.as_slice()),
            Bind::Json(value) => query.bind(Json(value)),
        };
    }
    query
}

/// Execute a statement whose rows are single JSON objects.
pub async fn fetch_rows(conn: &mut PgConnection, stmt: &Statement) -> Result<Vec<Record>> {
    let rows = bind_all(sqlx::query_scalar::<_, Value>(&stmt.sql), &stmt.binds)
        .fetch_all(&mut *conn)
        .await?;
    rows.into_iter()
        .map(|row| Record::from_value(row).map_err(Into::into))
        .collect()
}

async fn fetch_optional_row(conn: &mut PgConnection, stmt: &Statement) -> Result<Option<Record>> {
    let row = bind_all(sqlx::query_scalar::<_, Value>(&stmt.sql), &stmt.binds)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(Record::from_value).transpose()?)
}

async fn fetch_count(conn: &mut PgConnection, stmt: &Statement) -> Result<i64> {
    Ok(bind_all(sqlx::query_scalar::<_, i64>(&stmt.sql), &stmt.binds)
        .fetch_one(&mut *conn)
        .await?)
}

/// Read rows from a table or a projection.
///
/// `caller` scopes the projections that are per-user.
pub async fn select(conn: &mut PgConnection, source: &Source, caller: &str) -> Result<Vec<Record>> {
    match source {
        Source::Table {
            descriptor,
            predicate,
            order_by,
        } => {
            let stmt = statement::select(descriptor, predicate, order_by)?;
            let rows = fetch_rows(conn, &stmt).await?;
            tracing::debug!(table = descriptor.name, rows = rows.len(), "Selected rows");
            Ok(rows.into_iter().map(|r| r.normalize(descriptor)).collect())
        }
        Source::Projection(projection) => {
            let rows = fetch_rows(conn, &projection.statement(caller)).await?;
            tracing::debug!(projection = projection.label(), rows = rows.len(), "Selected rows");
            Ok(rows)
        }
    }
}

/// Read exactly one row, failing with `EmptyResult` when there is none.
pub async fn select_one(conn: &mut PgConnection, source: &Source, caller: &str) -> Result<Record> {
    select(conn, source, caller)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::EmptyResult(source.label().to_string()).into())
}

/// Insert all records in one statement, returning them as stored.
pub async fn insert(
    conn: &mut PgConnection,
    table: Table,
    records: &[Record],
) -> Result<Vec<Record>> {
    let descriptor = table.descriptor();
    let stmt = statement::insert(descriptor, records)?;
    let rows = fetch_rows(conn, &stmt).await?;
    tracing::debug!(table = descriptor.name, rows = rows.len(), "Inserted rows");
    Ok(rows.into_iter().map(|r| r.normalize(descriptor)).collect())
}

/// Update each record by primary key, returning the post-update rows.
pub async fn update(
    conn: &mut PgConnection,
    table: Table,
    records: &[Record],
) -> Result<Vec<Record>> {
    let descriptor = table.descriptor();
    if records.is_empty() {
        return Err(Error::NoChange(format!("nothing to update in '{}'", descriptor.name)).into());
    }

    let mut updated = Vec::with_capacity(records.len());
    for record in records {
        let stmt = statement::update(descriptor, record)?;
        let row = fetch_optional_row(conn, &stmt)
            .await?
            .ok_or_else(|| Error::EmptyResult(descriptor.name.to_string()))?;
        updated.push(row.normalize(descriptor));
    }
    tracing::debug!(table = descriptor.name, rows = updated.len(), "Updated rows");
    Ok(updated)
}

/// Delete the rows matched by `predicate`, returning them.
///
/// If any matched row is system-owned nothing is deleted and the call fails
/// with `ProtectedRecord`.
pub async fn delete(
    conn: &mut PgConnection,
    table: Table,
    predicate: &Predicate,
) -> Result<Vec<Record>> {
    let descriptor = table.descriptor();
    refuse_protected(conn, descriptor, predicate).await?;
    remove(conn, descriptor, predicate).await
}

/// Delete the caller's rows among those matched by `predicate`.
///
/// The system-row check sees every matched row, so naming a system row still
/// fails with `ProtectedRecord`. Rows of other users are left in place.
pub async fn delete_owned(
    conn: &mut PgConnection,
    table: Table,
    predicate: &Predicate,
    caller: &str,
) -> Result<Vec<Record>> {
    let descriptor = table.descriptor();
    refuse_protected(conn, descriptor, predicate).await?;
    remove(conn, descriptor, &predicate.clone().restrict_owners(&[caller])).await
}

async fn refuse_protected(
    conn: &mut PgConnection,
    descriptor: &TableDescriptor,
    predicate: &Predicate,
) -> Result<()> {
    if let Some(check) = statement::protected_count(descriptor, predicate)? {
        let protected = fetch_count(conn, &check).await?;
        if protected > 0 {
            tracing::warn!(table = descriptor.name, protected, "Refused to delete system rows");
            return Err(Error::Protected(descriptor.name.to_string()).into());
        }
    }
    Ok(())
}

async fn remove(
    conn: &mut PgConnection,
    descriptor: &TableDescriptor,
    predicate: &Predicate,
) -> Result<Vec<Record>> {
    let stmt = statement::delete(descriptor, predicate)?;
    let rows = fetch_rows(conn, &stmt).await?;
    tracing::debug!(table = descriptor.name, rows = rows.len(), "Deleted rows");
    Ok(rows.into_iter().map(|r| r.normalize(descriptor)).collect())
}

/// Insert or fully replace each record by primary key.
///
/// The modification time is always the server's `now`. A blank creation
/// time is dropped so the column default applies.
pub async fn upsert(
    conn: &mut PgConnection,
    table: Table,
    records: Vec<Record>,
    now: Timestamp,
) -> Result<Vec<Record>> {
    let descriptor = table.descriptor();
    if records.is_empty() {
        return Err(Error::NoChange(format!("nothing to upsert into '{}'", descriptor.name)).into());
    }

    let mut stored = Vec::with_capacity(records.len());
    for mut record in records {
        if record.get_str(CREATED_AT) == Some("") {
            record.remove(CREATED_AT);
        }
        record.touch(descriptor, now);

        let stmt = statement::upsert(descriptor, &record)?;
        let row = fetch_optional_row(conn, &stmt).await?;
        match row {
            Some(row) => stored.push(row.normalize(descriptor)),
            // DO NOTHING on a key-only row that already exists.
            None => stored.push(record.normalize(descriptor)),
        }
    }
    tracing::debug!(
        table = descriptor.name,
        rows = stored.len(),
        at = %format_timestamp(now),
        "Upserted rows"
    );
    Ok(stored)
}
