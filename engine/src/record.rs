//! Record types: one row as an ordered field → value map.

use crate::clock::format_timestamp;
use crate::table::{TableDescriptor, CREATED_AT, CREATED_BY, SYSTEM_OWNER, UPDATED_AT, UPDATED_BY};
use crate::{error::Result, Error, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Identity of a record under some set of key columns.
///
/// Values are compared through their text form so that `7` and `"7"` name the
/// same row, which is how keys round-trip through form inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey(Vec<String>);

impl RecordKey {
    pub fn parts(&self) -> &[String] {
        &self.0
    }

    fn part(value: &Value) -> Option<String> {
        match value {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

/// A single row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a record from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(Error::invalid(format!(
                "expected a JSON object for a record, got {other}"
            ))),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Key under the given columns, or `None` if any part is missing, null or blank.
    pub fn key(&self, columns: &[&str]) -> Option<RecordKey> {
        columns
            .iter()
            .map(|c| self.0.get(*c).and_then(RecordKey::part))
            .collect::<Option<Vec<_>>>()
            .map(RecordKey)
    }

    /// Primary-key identity. `None` marks an insert target.
    pub fn identity(&self, descriptor: &TableDescriptor) -> Option<RecordKey> {
        self.key(descriptor.primary_key)
    }

    /// Fail with `MissingKey` unless every primary-key column is present.
    pub fn require_identity(&self, descriptor: &TableDescriptor) -> Result<RecordKey> {
        for column in descriptor.primary_key {
            if self.0.get(*column).and_then(RecordKey::part).is_none() {
                return Err(Error::MissingKey {
                    table: descriptor.name.to_string(),
                    column: column.to_string(),
                });
            }
        }
        self.identity(descriptor).ok_or_else(|| Error::MissingKey {
            table: descriptor.name.to_string(),
            column: descriptor.primary_key.join(","),
        })
    }

    pub fn owner(&self, descriptor: &TableDescriptor) -> Option<&str> {
        descriptor.owner.and_then(|column| self.get_str(column))
    }

    pub fn is_system_owned(&self, descriptor: &TableDescriptor) -> bool {
        self.owner(descriptor) == Some(SYSTEM_OWNER)
    }

    /// Stamp creator and modifier identity and time, on the columns the table has.
    pub fn stamp_insert(&mut self, descriptor: &TableDescriptor, caller: &str, now: Timestamp) {
        let now = format_timestamp(now);
        if descriptor.has_column(CREATED_BY) {
            self.insert(CREATED_BY, caller);
        }
        if descriptor.has_column(CREATED_AT) {
            self.insert(CREATED_AT, now.clone());
        }
        self.stamp_modified(descriptor, caller, &now);
    }

    /// Stamp the modifier, and drop creation stamps so they are never overwritten.
    pub fn stamp_update(&mut self, descriptor: &TableDescriptor, caller: &str, now: Timestamp) {
        self.strip_creation();
        self.stamp_modified(descriptor, caller, &format_timestamp(now));
    }

    /// Stamp as an insert when the record has no identity, otherwise as an update.
    pub fn stamp_upsert(&mut self, descriptor: &TableDescriptor, caller: &str, now: Timestamp) {
        if self.identity(descriptor).is_some() {
            self.stamp_update(descriptor, caller, now);
        } else {
            self.drop_empty_keys(descriptor);
            self.stamp_insert(descriptor, caller, now);
        }
    }

    fn stamp_modified(&mut self, descriptor: &TableDescriptor, caller: &str, now: &str) {
        if descriptor.has_column(UPDATED_BY) {
            self.insert(UPDATED_BY, caller);
        }
        if descriptor.has_column(UPDATED_AT) {
            self.insert(UPDATED_AT, now);
        }
    }

    /// Set only the "last modified" time.
    pub fn touch(&mut self, descriptor: &TableDescriptor, now: Timestamp) {
        if descriptor.has_column(UPDATED_AT) {
            self.insert(UPDATED_AT, format_timestamp(now));
        }
    }

    pub fn strip_creation(&mut self) {
        self.remove(CREATED_AT);
        self.remove(CREATED_BY);
    }

    /// Remove primary-key fields that carry no value (null or blank).
    pub fn drop_empty_keys(&mut self, descriptor: &TableDescriptor) {
        for column in descriptor.primary_key {
            if self.0.get(*column).and_then(RecordKey::part).is_none() {
                self.remove(column);
            }
        }
    }

    /// Remove database-generated key columns entirely.
    pub fn drop_generated_keys(&mut self, descriptor: &TableDescriptor) {
        if descriptor.generated_key {
            for column in descriptor.primary_key {
                self.remove(column);
            }
        }
    }

    /// Remove fields holding an empty string, as blank form inputs do.
    pub fn drop_blank(&mut self) {
        let blank: Vec<String> = self
            .0
            .iter()
            .filter(|(_, v)| v.as_str() == Some(""))
            .map(|(k, _)| k.clone())
            .collect();
        for field in blank {
            self.remove(&field);
        }
    }

    /// Keep only fields that are columns of the table.
    pub fn retain_columns(&mut self, descriptor: &TableDescriptor) {
        let unknown: Vec<String> = self
            .0
            .keys()
            .filter(|k| !descriptor.has_column(k))
            .cloned()
            .collect();
        for field in unknown {
            self.remove(&field);
        }
    }

    /// Reorder fields: table columns in declared order, then any extra
    /// fields in the order they arrived.
    pub fn normalize(self, descriptor: &TableDescriptor) -> Record {
        let mut known: Vec<Option<(String, Value)>> = vec![None; descriptor.columns.len()];
        let mut extras = Vec::new();

        for (field, value) in self.0 {
            match descriptor.position(&field) {
                Some(index) => known[index] = Some((field, value)),
                None => extras.push((field, value)),
            }
        }

        known.into_iter().flatten().chain(extras).collect()
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl TryFrom<Value> for Record {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Record::from_value(value)
    }
}

/// Build a record from a `json!` object literal.
#[macro_export]
macro_rules! record {
    ($($tt:tt)*) => {
        $crate::Record::from_value(serde_json::json!({ $($tt)* }))
            .expect("record! takes an object literal")
    };
}
