//! Behavior configuration.
//!
//! [`PivotSaveOptions`] is the serializable part (attribute name, pivot
//! relation and the two flags) and can be loaded from TOML or JSON.
//! [`PivotSaveConfig`] adds the pieces that cannot be serialized: the finder
//! for the related record type and the optional closures.

use crate::behavior::PivotSaveBehavior;
use crate::error::{PivotError, PivotResult};
use crate::record::{ModelFinder, PivotRelation};
use crate::value::{PivotValue, StagedPivot};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// Rewrites the assigned sequence before it is classified.
pub type PrepareValues<R> = Rc<dyn Fn(Vec<PivotValue<R>>) -> Vec<PivotValue<R>>>;

/// Replaces the lifecycle hook: receives the behavior, the pivot relation and
/// the freshly staged list right after each assignment.
pub type CustomSave<R> =
    Rc<dyn Fn(&PivotSaveBehavior<R>, &PivotRelation, &[StagedPivot<R>]) -> PivotResult<()>>;

/// How staged pivots reach storage.
pub enum SaveStrategy<R> {
    /// Synchronize when the host fires its after-insert/after-update event.
    Deferred,
    /// Call the given function immediately on assignment.
    Custom(CustomSave<R>),
}

impl<R> Clone for SaveStrategy<R> {
    fn clone(&self) -> Self {
        match self {
            Self::Deferred => Self::Deferred,
            Self::Custom(save) => Self::Custom(Rc::clone(save)),
        }
    }
}

impl<R> fmt::Debug for SaveStrategy<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deferred => f.write_str("Deferred"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

fn default_delete_before_save() -> bool {
    true
}

/// Serializable behavior options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PivotSaveOptions {
    pub attribute: String,
    pub relation: PivotRelation,
    #[serde(default = "default_delete_before_save")]
    pub delete_pivots_before_save: bool,
    #[serde(default)]
    pub inverse_insert_pivot: bool,
}

impl PivotSaveOptions {
    pub fn new(attribute: impl Into<String>, relation: impl Into<PivotRelation>) -> Self {
        Self {
            attribute: attribute.into(),
            relation: relation.into(),
            delete_pivots_before_save: default_delete_before_save(),
            inverse_insert_pivot: false,
        }
    }

    pub fn from_toml_str(contents: &str) -> PivotResult<Self> {
        toml::from_str(contents).map_err(|e| PivotError::Options(e.to_string()))
    }

    pub fn from_json_str(contents: &str) -> PivotResult<Self> {
        serde_json::from_str(contents).map_err(|e| PivotError::Options(e.to_string()))
    }
}

/// Full configuration of a [`PivotSaveBehavior`].
pub struct PivotSaveConfig<R> {
    pub(crate) attribute: String,
    pub(crate) finder: Rc<dyn ModelFinder<R>>,
    pub(crate) relation: PivotRelation,
    pub(crate) prepare_values: Option<PrepareValues<R>>,
    pub(crate) save: SaveStrategy<R>,
    pub(crate) delete_pivots_before_save: bool,
    pub(crate) inverse_insert_pivot: bool,
}

impl<R> PivotSaveConfig<R> {
    pub fn new(
        attribute: impl Into<String>,
        finder: Rc<dyn ModelFinder<R>>,
        relation: impl Into<PivotRelation>,
    ) -> Self {
        Self::from_options(PivotSaveOptions::new(attribute, relation), finder)
    }

    pub fn from_options(options: PivotSaveOptions, finder: Rc<dyn ModelFinder<R>>) -> Self {
        Self {
            attribute: options.attribute,
            finder,
            relation: options.relation,
            prepare_values: None,
            save: SaveStrategy::Deferred,
            delete_pivots_before_save: options.delete_pivots_before_save,
            inverse_insert_pivot: options.inverse_insert_pivot,
        }
    }

    pub fn prepare_values<F>(mut self, prepare: F) -> Self
    where
        F: Fn(Vec<PivotValue<R>>) -> Vec<PivotValue<R>> + 'static,
    {
        self.prepare_values = Some(Rc::new(prepare));
        self
    }

    pub fn custom_save<F>(mut self, save: F) -> Self
    where
        F: Fn(&PivotSaveBehavior<R>, &PivotRelation, &[StagedPivot<R>]) -> PivotResult<()>
            + 'static,
    {
        self.save = SaveStrategy::Custom(Rc::new(save));
        self
    }

    pub fn delete_pivots_before_save(mut self, enabled: bool) -> Self {
        self.delete_pivots_before_save = enabled;
        self
    }

    pub fn inverse_insert_pivot(mut self, enabled: bool) -> Self {
        self.inverse_insert_pivot = enabled;
        self
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn relation(&self) -> &PivotRelation {
        &self.relation
    }

    pub fn finder(&self) -> &Rc<dyn ModelFinder<R>> {
        &self.finder
    }

    pub fn save_strategy(&self) -> &SaveStrategy<R> {
        &self.save
    }

    pub fn deletes_before_save(&self) -> bool {
        self.delete_pivots_before_save
    }

    pub fn inverts_insert(&self) -> bool {
        self.inverse_insert_pivot
    }

    /// The serializable part of this configuration.
    pub fn options(&self) -> PivotSaveOptions {
        PivotSaveOptions {
            attribute: self.attribute.clone(),
            relation: self.relation.clone(),
            delete_pivots_before_save: self.delete_pivots_before_save,
            inverse_insert_pivot: self.inverse_insert_pivot,
        }
    }
}
