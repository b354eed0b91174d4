use crate::error::{BoxError, PivotError, PivotResult};
use crate::events::{Events, LifecycleEvent};
use crate::value::PivotAttributes;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Primary key of a record, column name to value.
///
/// Single-column keys are a one-entry map. Ordered so the same key always
/// serializes to the same JSON text.
pub type PrimaryKey = BTreeMap<String, Value>;

/// Identifies a pivot (junction) relation, e.g. `"post_tag"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PivotRelation(String);

impl PivotRelation {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PivotRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PivotRelation {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for PivotRelation {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Which end of a pivot row a record occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PivotSide {
    /// The record inserted the row (`add_pivot` was called on it).
    Owner,
    /// The record was passed as `related` to another record's `add_pivot`.
    Related,
}

impl fmt::Display for PivotSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owner => f.write_str("owner"),
            Self::Related => f.write_str("related"),
        }
    }
}

/// Table name and primary-key columns of a record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: String,
    pub primary_key: Vec<String>,
}

impl TableSchema {
    pub fn new(table: impl Into<String>, primary_key: &[&str]) -> Self {
        Self {
            table: table.into(),
            primary_key: primary_key.iter().map(|c| (*c).to_string()).collect(),
        }
    }
}

/// Anything that can sit on either side of a pivot row.
pub trait Record {
    /// Type name used in error messages.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn table_name(&self) -> &str;

    fn primary_key(&self) -> PrimaryKey;

    /// Pivot-management capability, if this record type has one.
    fn pivots(&self) -> Option<&dyn PivotCapable> {
        None
    }
}

/// Insert/delete access to the pivot relations of one record.
pub trait PivotCapable {
    /// Inserts a pivot row linking this record to `related`.
    fn add_pivot(
        &self,
        related: &dyn Record,
        relation: &PivotRelation,
        attributes: &PivotAttributes,
    ) -> Result<(), BoxError>;

    /// Deletes the rows of `relation` in which this record sits on `side`.
    /// Rows where it sits on the other side are left alone.
    fn delete_pivots(&self, relation: &PivotRelation, side: PivotSide) -> Result<(), BoxError>;
}

/// A host record with a save lifecycle.
pub trait ActiveRecord: Record + Sized {
    /// `true` until the record has been inserted.
    fn is_new_record(&self) -> bool;

    fn insert(&mut self) -> Result<(), BoxError>;

    fn update(&mut self) -> Result<(), BoxError>;

    fn events_mut(&mut self) -> &mut Events<Self>;

    /// Assigns a real (non-virtual) property.
    fn set_attribute(&mut self, name: &str, _value: Value) -> PivotResult<()> {
        Err(PivotError::UnknownProperty {
            type_name: self.type_name().to_string(),
            name: name.to_string(),
        })
    }

    /// Reads a real (non-virtual) property.
    fn get_attribute(&self, name: &str) -> PivotResult<Value> {
        Err(PivotError::UnknownProperty {
            type_name: self.type_name().to_string(),
            name: name.to_string(),
        })
    }

    /// Inserts or updates the record, then fires the matching lifecycle event.
    fn save(&mut self) -> PivotResult<()> {
        let event = if self.is_new_record() {
            self.insert().map_err(PivotError::Storage)?;
            LifecycleEvent::AfterInsert
        } else {
            self.update().map_err(PivotError::Storage)?;
            LifecycleEvent::AfterUpdate
        };
        Events::trigger(self, event)
    }
}

/// Lookup and schema introspection for the related record type.
pub trait ModelFinder<R> {
    /// Finds a record by its (single-column) primary key.
    fn find_one(&self, id: &Number) -> Result<Option<R>, BoxError>;

    fn table_schema(&self) -> TableSchema;
}
