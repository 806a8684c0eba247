//! Request shapes for the generic CRUD surface.
//!
//! Every call is an [`Operation`]: a tagged union carrying its table, filter
//! and records. Operations validate themselves against the table catalog
//! before anything reaches the database.

use crate::filter::{FilterExpression, Predicate};
use crate::projection::Projection;
use crate::record::Record;
use crate::table::{Table, TableDescriptor};
use crate::{error::Result, Error};
use serde::{Deserialize, Serialize};

/// One record or a list of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Records {
    One(Record),
    Many(Vec<Record>),
}

impl Records {
    pub fn into_vec(self) -> Vec<Record> {
        match self {
            Records::One(record) => vec![record],
            Records::Many(records) => records,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Records::One(_) => 1,
            Records::Many(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<Record>> for Records {
    fn from(records: Vec<Record>) -> Self {
        Records::Many(records)
    }
}

/// A read, from a table or from a projection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<Table>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<Projection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterExpression>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<String>,
}

/// Validated origin of a read.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Table {
        descriptor: &'static TableDescriptor,
        predicate: Predicate,
        order_by: Vec<String>,
    },
    Projection(Projection),
}

impl Source {
    pub fn label(&self) -> &'static str {
        match self {
            Source::Table { descriptor, .. } => descriptor.table.label(),
            Source::Projection(projection) => projection.label(),
        }
    }

    /// Limit a table read to rows owned by one of `owners`.
    ///
    /// Projections carry their own caller scoping and are returned unchanged.
    pub fn restrict_owners<S: AsRef<str>>(self, owners: &[S]) -> Self {
        match self {
            Source::Table {
                descriptor,
                predicate,
                order_by,
            } => Source::Table {
                descriptor,
                predicate: predicate.restrict_owners(owners),
                order_by,
            },
            projection => projection,
        }
    }
}

impl SelectRequest {
    pub fn table(table: Table) -> Self {
        Self {
            table: Some(table),
            ..Self::default()
        }
    }

    pub fn projection(projection: Projection) -> Self {
        Self {
            projection: Some(projection),
            ..Self::default()
        }
    }

    pub fn filtered(mut self, filters: FilterExpression) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn ordered_by(mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.order_by = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Resolve to exactly one source.
    ///
    /// Filters and ordering only apply to tables; supplying either with a
    /// projection is rejected rather than ignored.
    pub fn source(&self) -> Result<Source> {
        match (&self.table, &self.projection) {
            (Some(table), None) => {
                let descriptor = table.descriptor();
                let predicate = match &self.filters {
                    Some(filters) => filters.build(descriptor)?,
                    None => Predicate::match_all(*table),
                };
                Ok(Source::Table {
                    descriptor,
                    predicate,
                    order_by: self.order_by.clone(),
                })
            }
            (None, Some(projection)) => {
                let filtered = self.filters.as_ref().is_some_and(|f| !f.is_empty());
                if filtered || !self.order_by.is_empty() {
                    return Err(Error::invalid(
                        "filters and order_by cannot be combined with a projection",
                    ));
                }
                Ok(Source::Projection(projection.clone()))
            }
            (Some(_), Some(_)) => Err(Error::invalid(
                "select takes a table or a projection, not both",
            )),
            (None, None) => Err(Error::invalid("select needs a table or a projection")),
        }
    }
}

/// Rows to insert, update or upsert into one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub table: Table,
    pub data: Records,
}

impl WriteRequest {
    pub fn new(table: Table, data: impl Into<Records>) -> Self {
        Self {
            table,
            data: data.into(),
        }
    }
}

/// Rows of one table to delete, selected by filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub table: Table,
    #[serde(default)]
    pub filters: FilterExpression,
}

impl DeleteRequest {
    pub fn predicate(&self) -> Result<Predicate> {
        self.filters.build(self.table.descriptor())
    }
}

/// A generic CRUD call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum Operation {
    Select(SelectRequest),
    Insert(WriteRequest),
    Update(WriteRequest),
    Delete(DeleteRequest),
    Upsert(WriteRequest),
}

impl Operation {
    /// Name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Select(_) => "select",
            Operation::Insert(_) => "insert",
            Operation::Update(_) => "update",
            Operation::Delete(_) => "delete",
            Operation::Upsert(_) => "upsert",
        }
    }

    /// Target table, if the operation names one directly.
    pub fn table(&self) -> Option<Table> {
        match self {
            Operation::Select(req) => req.table,
            Operation::Insert(req) | Operation::Update(req) | Operation::Upsert(req) => {
                Some(req.table)
            }
            Operation::Delete(req) => Some(req.table),
        }
    }
}
