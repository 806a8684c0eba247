//! Three-way reconciliation of a child collection.
//!
//! Given the persisted rows of one parent scope (the snapshot) and the rows a
//! caller wants to end up with (the candidate), the [`Reconciler`] partitions
//! them by merge key into rows to insert, update and delete.
//!
//! # Algorithm
//!
//! 1. Index the snapshot by merge key
//! 2. Drop rows owned by someone other than the caller
//! 3. Walk the candidate in order: unmatched keys insert, matched keys update
//! 4. Snapshot rows no candidate matched are deleted, in snapshot order
//!
//! The same inputs always produce the same three sets in the same order.
//! [`check_stale`] is the optimistic-concurrency gate run before any of this.

use crate::clock::{format_timestamp, parse_timestamp};
use crate::filter::FilterExpression;
use crate::record::{Record, RecordKey};
use crate::table::{Table, TableDescriptor, UPDATED_AT};
use crate::{error::Result, Error, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Columns that identify a row across snapshot and candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeKey {
    /// The table's primary key.
    PrimaryKey,
    /// An application-defined natural key.
    Natural(&'static [&'static str]),
}

impl MergeKey {
    pub fn columns(&self, descriptor: &TableDescriptor) -> &'static [&'static str] {
        match self {
            MergeKey::PrimaryKey => descriptor.primary_key,
            MergeKey::Natural(columns) => columns,
        }
    }
}

/// A table whose rows belong to one parent row.
#[derive(Debug, Clone, Copy)]
pub struct ChildCollection {
    pub descriptor: &'static TableDescriptor,
    pub parent_column: &'static str,
    pub merge_key: MergeKey,
}

impl ChildCollection {
    /// Ingredient lines of a recipe.
    pub fn recipe_ingredients() -> Self {
        Self {
            descriptor: Table::RecipeIngredients.descriptor(),
            parent_column: "id_recipe",
            merge_key: MergeKey::PrimaryKey,
        }
    }

    /// Filter selecting every row under `parent`.
    pub fn scope(&self, parent: &Value) -> Result<FilterExpression> {
        let value = crate::FilterValue::from_json(parent).ok_or_else(|| {
            Error::invalid(format!(
                "'{}' must be a scalar, got {parent}",
                self.parent_column
            ))
        })?;
        Ok(FilterExpression::new().and_in(self.parent_column, [value]))
    }

    /// Point every row at `parent`.
    pub fn adopt(&self, rows: &mut [Record], parent: &Value) {
        for row in rows {
            row.insert(self.parent_column, parent.clone());
        }
    }

    pub fn reconciler(&self) -> Result<Reconciler<'static>> {
        Reconciler::new(self.descriptor, self.merge_key)
    }
}

/// Number of rows each part of a diff touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffCounts {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Result of diffing a snapshot against a candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diff {
    /// Candidate rows with no snapshot counterpart, in candidate order.
    pub to_insert: Vec<Record>,
    /// Candidate values carried onto matched snapshot rows, in candidate order.
    pub to_update: Vec<Record>,
    /// Snapshot rows the candidate no longer contains, in snapshot order.
    pub to_delete: Vec<Record>,
    /// Rows left out because another user owns them.
    pub skipped: usize,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    pub fn counts(&self) -> DiffCounts {
        DiffCounts {
            inserted: self.to_insert.len(),
            updated: self.to_update.len(),
            deleted: self.to_delete.len(),
        }
    }
}

/// Computes keyed three-way diffs for one table.
#[derive(Debug, Clone)]
pub struct Reconciler<'a> {
    descriptor: &'a TableDescriptor,
    columns: &'static [&'static str],
    caller: Option<&'a str>,
}

impl<'a> Reconciler<'a> {
    /// Create a reconciler, checking the merge key against the table.
    pub fn new(descriptor: &'a TableDescriptor, merge_key: MergeKey) -> Result<Self> {
        let columns = merge_key.columns(descriptor);
        if columns.is_empty() {
            return Err(Error::invalid(format!(
                "empty merge key for '{}'",
                descriptor.name
            )));
        }
        for column in columns {
            descriptor.require_column(column)?;
        }
        Ok(Self {
            descriptor,
            columns,
            caller: None,
        })
    }

    /// Restrict every diff set to rows owned by `caller`.
    ///
    /// Snapshot rows must name the caller as owner. Candidate rows with no
    /// owner value count as the caller's.
    pub fn owned_by(mut self, caller: &'a str) -> Self {
        self.caller = Some(caller);
        self
    }

    fn is_foreign(&self, row: &Record, missing_is_own: bool) -> bool {
        let (Some(caller), Some(_)) = (self.caller, self.descriptor.owner) else {
            return false;
        };
        match row.owner(self.descriptor) {
            Some(owner) => owner != caller,
            None => !missing_is_own,
        }
    }

    pub fn diff(&self, snapshot: &[Record], candidate: &[Record]) -> Result<Diff> {
        let mut diff = Diff::default();

        // key -> (row index, owned by caller)
        let mut persisted: BTreeMap<RecordKey, (usize, bool)> = BTreeMap::new();
        for (index, row) in snapshot.iter().enumerate() {
            let Some(key) = row.key(self.columns) else {
                continue;
            };
            let owned = !self.is_foreign(row, false);
            if persisted.insert(key.clone(), (index, owned)).is_some() {
                return Err(Error::DuplicateKey(key.to_string()));
            }
        }

        let mut seen = BTreeSet::new();
        let mut matched = BTreeSet::new();
        for row in candidate {
            let key = row.key(self.columns);
            if let Some(key) = &key {
                if !seen.insert(key.clone()) {
                    return Err(Error::DuplicateKey(key.to_string()));
                }
            }

            let existing = key.and_then(|k| persisted.get(&k).copied());
            if self.is_foreign(row, true) {
                // A matched row stays as persisted.
                if let Some((index, _)) = existing {
                    matched.insert(index);
                }
                diff.skipped += 1;
                continue;
            }

            match existing {
                None => diff.to_insert.push(row.clone()),
                Some((index, false)) => {
                    matched.insert(index);
                    diff.skipped += 1;
                }
                Some((index, true)) => {
                    matched.insert(index);
                    let mut update = row.clone();
                    for column in self.descriptor.primary_key {
                        if let Some(value) = snapshot[index].get(column) {
                            update.insert(*column, value.clone());
                        }
                    }
                    diff.to_update.push(update);
                }
            }
        }

        for (index, row) in snapshot.iter().enumerate() {
            if matched.contains(&index) || row.key(self.columns).is_none() {
                continue;
            }
            if self.is_foreign(row, false) {
                diff.skipped += 1;
            } else {
                diff.to_delete.push(row.clone());
            }
        }

        Ok(diff)
    }
}

/// Fail with [`Error::Stale`] if any row was modified after `reference`.
///
/// Rows without a modification time never count as stale.
pub fn check_stale(
    descriptor: &TableDescriptor,
    rows: &[Record],
    reference: Timestamp,
) -> Result<()> {
    for row in rows {
        let Some(modified) = row.get_str(UPDATED_AT) else {
            continue;
        };
        let modified_at = parse_timestamp(modified)?;
        if modified_at > reference {
            return Err(Error::Stale {
                table: descriptor.name.to_string(),
                modified_at: format_timestamp(modified_at),
                reference: format_timestamp(reference),
            });
        }
    }
    Ok(())
}
