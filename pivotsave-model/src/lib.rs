//! Declarative many-to-many pivot synchronization for active records.
//!
//! A host record gets a virtual attribute (say `tags`). Assigning a list of
//! related records, identifiers or `{model, attributes}` maps to it stages the
//! links; once the host is saved, the links are written into a pivot relation:
//! - [`PivotSaveBehavior`] — stages assignments and synchronizes the pivot rows
//! - [`PivotSaveConfig`] / [`PivotSaveOptions`] — behavior configuration
//! - [`Record`], [`ActiveRecord`], [`PivotCapable`], [`ModelFinder`] — what the
//!   host, the related record type and the storage layer have to provide
//! - [`Events`] — one-time lifecycle listeners the host fires after saving
//!
//! Storage is not part of this crate; see `pivotsave-store` for a SQLite
//! implementation of the collaborator traits.

mod behavior;
mod config;
mod error;
mod events;
mod record;
mod value;

pub use behavior::{PivotSaveBehavior, pivot_condition};
pub use config::{CustomSave, PivotSaveConfig, PivotSaveOptions, PrepareValues, SaveStrategy};
pub use error::{BoxError, PivotError, PivotResult};
pub use events::{EventContext, Events, LifecycleEvent};
pub use record::{
    ActiveRecord, ModelFinder, PivotCapable, PivotRelation, PivotSide, PrimaryKey, Record,
    TableSchema,
};
pub use value::{PivotAttributes, PivotValue, Property, StagedPivot, numeric_key};
