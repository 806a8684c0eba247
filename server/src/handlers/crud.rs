//! Generic CRUD handlers.
//!
//! Requests are validated against the table catalog before a transaction is
//! opened, so malformed calls never hold a pool connection.
//!
//! Table reads see the caller's rows and system rows; deletes only ever remove
//! the caller's rows. Tables without an owner column are not scoped.

use crate::db::{self, Outcome};
use crate::error::AppError;
use crate::AppState;
use futures::FutureExt;
use larder_engine::{DeleteRequest, Operation, Record, SelectRequest, WriteRequest, SYSTEM_OWNER};

/// Reject `operation` before it reaches the database.
fn rejected<T>(operation: &str, err: impl Into<AppError>) -> Outcome<T> {
    Outcome::failure(operation, &err.into())
}

/// Read rows from a table or projection.
pub async fn handle_select(
    state: &AppState,
    caller: &str,
    request: SelectRequest,
) -> Outcome<Vec<Record>> {
    let source = match request.source() {
        Ok(source) => source.restrict_owners(&[caller, SYSTEM_OWNER]),
        Err(e) => return rejected("select", e),
    };
    let message = format!("{} retrieved.", source.label());
    let caller = caller.to_string();

    db::run(&state.pool, "select", message, |conn| {
        async move { db::select(conn, &source, &caller).await }.boxed()
    })
    .await
}

/// Insert new rows stamped with the caller as creator.
pub async fn handle_insert(
    state: &AppState,
    caller: &str,
    request: WriteRequest,
) -> Outcome<Vec<Record>> {
    let table = request.table;
    let descriptor = table.descriptor();
    let now = state.clock.now();

    let records: Vec<Record> = request
        .data
        .into_vec()
        .into_iter()
        .map(|mut record| {
            record.drop_empty_keys(descriptor);
            record.stamp_insert(descriptor, caller, now);
            record
        })
        .collect();

    let message = format!("{} inserted successfully.", table.label());
    db::run(&state.pool, "insert", message, |conn| {
        async move { db::insert(conn, table, &records).await }.boxed()
    })
    .await
}

/// Update rows by primary key, stamping the caller as modifier.
pub async fn handle_update(
    state: &AppState,
    caller: &str,
    request: WriteRequest,
) -> Outcome<Vec<Record>> {
    let table = request.table;
    let descriptor = table.descriptor();
    let now = state.clock.now();

    let records: Vec<Record> = request
        .data
        .into_vec()
        .into_iter()
        .map(|mut record| {
            record.stamp_update(descriptor, caller, now);
            record
        })
        .collect();

    let message = format!("{} updated successfully.", table.label());
    db::run(&state.pool, "update", message, |conn| {
        async move { db::update(conn, table, &records).await }.boxed()
    })
    .await
}

/// Delete the caller's rows among those a filter selects. System rows are
/// never deleted.
pub async fn handle_delete(
    state: &AppState,
    caller: &str,
    request: DeleteRequest,
) -> Outcome<Vec<Record>> {
    let table = request.table;
    let predicate = match request.predicate() {
        Ok(predicate) => predicate,
        Err(e) => return rejected("delete", e),
    };
    let caller = caller.to_string();

    let message = format!("{} deleted successfully.", table.label());
    db::run(&state.pool, "delete", message, |conn| {
        async move { db::delete_owned(conn, table, &predicate, &caller).await }.boxed()
    })
    .await
}

/// Insert or replace rows by primary key.
pub async fn handle_upsert(
    state: &AppState,
    caller: &str,
    request: WriteRequest,
) -> Outcome<Vec<Record>> {
    let table = request.table;
    let descriptor = table.descriptor();
    let now = state.clock.now();

    let records: Vec<Record> = request
        .data
        .into_vec()
        .into_iter()
        .map(|mut record| {
            record.stamp_upsert(descriptor, caller, now);
            record
        })
        .collect();

    let message = format!("{} upserted successfully.", table.label());
    db::run(&state.pool, "upsert", message, |conn| {
        async move { db::upsert(conn, table, records, now).await }.boxed()
    })
    .await
}

/// Dispatch a tagged operation to its handler.
pub async fn handle_operation(
    state: &AppState,
    caller: &str,
    operation: Operation,
) -> Outcome<Vec<Record>> {
    tracing::debug!(
        operation = operation.name(),
        table = ?operation.table(),
        "Dispatching operation"
    );
    match operation {
        Operation::Select(request) => handle_select(state, caller, request).await,
        Operation::Insert(request) => handle_insert(state, caller, request).await,
        Operation::Update(request) => handle_update(state, caller, request).await,
        Operation::Delete(request) => handle_delete(state, caller, request).await,
        Operation::Upsert(request) => handle_upsert(state, caller, request).await,
    }
}
