//! SQLite storage for pivotsave.
//!
//! Provides the storage collaborators the pivot save behavior works against:
//!
//! - [`PivotStore`] — one generic pivot table plus a JSON entity table
//! - [`Entity`] — an active record over the entity table that can own pivots
//! - [`EntityFinder`] — primary-key lookup of one entity type
//!
//! # Architecture
//!
//! - Every pivot relation shares the `pivots` table, keyed by relation name
//! - Both sides of a pivot row are stored as (table, primary key JSON)
//! - A UNIQUE constraint rejects a second identical link within a relation

mod entity;
mod error;
mod store;

pub use entity::{Entity, EntityFinder};
pub use error::{StoreError, StoreResult};
pub use store::{PivotRow, PivotStore};
