//! # Larder Engine
//!
//! The pure core of the Larder data-access layer.
//!
//! This crate knows every persisted table, turns declarative filters into
//! parameterized SQL, stamps audit columns and computes three-way diffs for
//! child collections. It never touches a database: the server crate executes
//! the [`Statement`]s built here inside its own transactions.
//!
//! ## Design Principles
//!
//! - **No IO**: statements are rendered, never executed
//! - **Closed catalog**: tables are a compile-time [`Table`] enum, so unknown
//!   tables and columns are rejected before any SQL exists
//! - **Deterministic**: diffs and rendered SQL depend only on their inputs
//!
//! ## Core Concepts
//!
//! ### Filters
//!
//! A [`FilterExpression`] holds four condition groups (`and_`, `or_`, `like_`,
//! `not_like_`) and builds into an opaque [`Predicate`] for one table.
//!
//! ### Statements
//!
//! The [`statement`] module renders select, insert, update, delete and upsert
//! for a [`TableDescriptor`]. Deletes always exclude rows owned by
//! [`SYSTEM_OWNER`].
//!
//! ### Reconciliation
//!
//! The [`Reconciler`] partitions a persisted snapshot and a submitted candidate
//! into rows to insert, update and delete, leaving other users' rows alone.
//! [`check_stale`] rejects a submission when anything changed after the
//! caller's reference time.
//!
//! ## Quick Start
//!
//! ```rust
//! use larder_engine::{statement, FilterExpression, Table};
//!
//! let units = Table::Units.descriptor();
//! let predicate = FilterExpression::new()
//!     .and_in("type", ["mass"])
//!     .build(units)
//!     .unwrap();
//!
//! let select = statement::select(units, &predicate, &["name".to_string()]).unwrap();
//! assert_eq!(
//!     select.sql,
//!     "SELECT row_to_json(t) FROM \"units\" AS t \
//!      WHERE (t.\"type\" = ANY($1)) ORDER BY t.\"name\", t.\"id\""
//! );
//! ```

pub mod clock;
pub mod error;
pub mod filter;
pub mod operation;
pub mod projection;
pub mod reconcile;
pub mod record;
pub mod statement;
pub mod table;

// Re-export main types at crate root
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{Error, ErrorKind};
pub use filter::{FilterExpression, FilterValue, Predicate};
pub use operation::{DeleteRequest, Operation, Records, SelectRequest, Source, WriteRequest};
pub use projection::Projection;
pub use reconcile::{check_stale, ChildCollection, Diff, DiffCounts, MergeKey, Reconciler};
pub use record::{Record, RecordKey};
pub use statement::{Bind, Statement};
pub use table::{ColumnDef, ColumnType, Table, TableDescriptor, SYSTEM_OWNER};

/// Naive UTC timestamp, as stored in `timestamp` columns.
pub type Timestamp = chrono::NaiveDateTime;
/// Identity of the user making a call.
pub type UserId = String;
