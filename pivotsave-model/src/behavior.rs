//! The pivot save behavior.
//!
//! A [`PivotSaveBehavior`] owns one virtual attribute of a host record. Values
//! assigned to that attribute are normalized into [`StagedPivot`]s and kept in
//! the behavior's staging area. Depending on the configured [`SaveStrategy`]
//! they are handed to a custom save function right away, or the behavior
//! subscribes to the host's next after-insert/after-update event and
//! synchronizes the pivot relation from there: existing rows are deleted, then
//! one row per staged pivot is inserted in staging order.

use crate::config::{PivotSaveConfig, SaveStrategy};
use crate::error::{PivotError, PivotResult};
use crate::events::LifecycleEvent;
use crate::record::{ActiveRecord, PivotSide, PrimaryKey, Record, TableSchema};
use crate::value::{PivotAttributes, PivotValue, Property, StagedPivot, numeric_key};
use serde_json::{Map, Number, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::{debug, warn};

struct Inner<R> {
    config: PivotSaveConfig<R>,
    staging: RefCell<BTreeMap<String, Vec<StagedPivot<R>>>>,
}

/// Stages related records for one attribute and syncs them into a pivot relation.
///
/// Cloning is cheap and clones share the staging area, which is how the
/// listener registered on the host sees later assignments.
pub struct PivotSaveBehavior<R> {
    inner: Rc<Inner<R>>,
}

impl<R> Clone for PivotSaveBehavior<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<R: Record + Clone + 'static> PivotSaveBehavior<R> {
    pub fn new(config: PivotSaveConfig<R>) -> Self {
        Self {
            inner: Rc::new(Inner {
                config,
                staging: RefCell::new(BTreeMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &PivotSaveConfig<R> {
        &self.inner.config
    }

    pub fn attribute(&self) -> &str {
        &self.inner.config.attribute
    }

    /// Whether `name` addresses the virtual attribute: either the attribute
    /// itself or a bracketed sub-key such as `tags[0]`.
    pub fn can_get_property(&self, name: &str) -> bool {
        self.addresses_attribute(name)
    }

    pub fn can_set_property(&self, name: &str) -> bool {
        self.addresses_attribute(name)
    }

    fn addresses_attribute(&self, name: &str) -> bool {
        let attribute = self.attribute();
        name == attribute
            || name
                .strip_prefix(attribute)
                .is_some_and(|rest| rest.starts_with('['))
    }

    /// Assigns `value` to `name`: staged when it addresses the virtual
    /// attribute, otherwise handed to the host's own attribute setter.
    pub fn set_property<H>(
        &self,
        owner: &mut H,
        name: &str,
        value: PivotValue<R>,
    ) -> PivotResult<()>
    where
        H: ActiveRecord + 'static,
    {
        if self.can_set_property(name) {
            return self.set_pivots(owner, value);
        }
        match value {
            PivotValue::Json(raw) => owner.set_attribute(name, raw),
            _ => Err(PivotError::UnknownProperty {
                type_name: owner.type_name().to_string(),
                name: name.to_string(),
            }),
        }
    }

    /// Reads `name`: the staged pivots for the virtual attribute, otherwise the
    /// host's own attribute.
    ///
    /// A bracketed name such as `tags[0]` reads the whole staged list, not one
    /// element. [`stored_pivots`](Self::stored_pivots) is exact-name only and
    /// yields `None` for bracketed names.
    pub fn get_property<H: ActiveRecord>(
        &self,
        owner: &H,
        name: &str,
    ) -> PivotResult<Property<R>> {
        if self.can_get_property(name) {
            Ok(Property::Pivots(self.pivots()))
        } else {
            owner.get_attribute(name).map(Property::Attribute)
        }
    }

    /// Staged pivots for `attribute`: `None` unless it is exactly the
    /// configured attribute, an empty list when nothing was assigned yet.
    pub fn stored_pivots(&self, attribute: &str) -> Option<Vec<StagedPivot<R>>> {
        if attribute != self.attribute() {
            return None;
        }
        Some(self.pivots())
    }

    /// Staged pivots of the configured attribute.
    pub fn pivots(&self) -> Vec<StagedPivot<R>> {
        self.inner
            .staging
            .borrow()
            .get(self.attribute())
            .cloned()
            .unwrap_or_default()
    }

    /// Normalizes `value`, replaces the staged list and schedules the save.
    pub fn set_pivots<H>(&self, owner: &mut H, value: PivotValue<R>) -> PivotResult<()>
    where
        H: ActiveRecord + 'static,
    {
        let staged = self.normalize(value)?;
        let attribute = self.attribute().to_string();
        debug!(
            "Staged {} pivot(s) for {}::{}",
            staged.len(),
            owner.type_name(),
            attribute
        );
        self.inner
            .staging
            .borrow_mut()
            .insert(attribute.clone(), staged);

        match &self.inner.config.save {
            SaveStrategy::Custom(save) => {
                let staged = self.pivots();
                save(self, &self.inner.config.relation, &staged)
            }
            SaveStrategy::Deferred => {
                // new-record status is read now, not when the host is saved
                let event = if owner.is_new_record() {
                    LifecycleEvent::AfterInsert
                } else {
                    LifecycleEvent::AfterUpdate
                };
                let behavior = self.clone();
                let added = owner.events_mut().on_keyed(
                    event,
                    &self.listener_key(),
                    attribute,
                    move |owner: &mut H, context| behavior.save_pivots(owner, &context.data),
                );
                if added {
                    debug!("Pivot sync for {} scheduled on {}", self.attribute(), event);
                }
                Ok(())
            }
        }
    }

    fn listener_key(&self) -> String {
        format!("pivot_save:{}", self.inner.config.relation)
    }

    fn normalize(&self, value: PivotValue<R>) -> PivotResult<Vec<StagedPivot<R>>> {
        let mut values = value.into_sequence();
        if let Some(prepare) = &self.inner.config.prepare_values {
            values = prepare(values);
        }

        let mut staged = Vec::with_capacity(values.len());
        for value in values {
            match value {
                PivotValue::Model(model) => staged.push(StagedPivot::new(Some(model), Map::new())),
                PivotValue::Linked { model, attributes } => {
                    staged.push(StagedPivot::new(Some(model), attributes))
                }
                PivotValue::Json(raw) => match numeric_key(&raw) {
                    Some(id) => staged.push(StagedPivot::new(self.find(&id)?, Map::new())),
                    None => match raw {
                        Value::Object(map) if map.contains_key("model") => {
                            staged.push(self.stage_map(map)?)
                        }
                        other => debug!("Skipping unrecognized pivot value {}", other),
                    },
                },
                PivotValue::List(_) => debug!("Skipping nested pivot list"),
            }
        }
        Ok(staged)
    }

    fn stage_map(&self, mut map: PivotAttributes) -> PivotResult<StagedPivot<R>> {
        let attributes = match map.remove("attributes") {
            Some(Value::Object(attributes)) => attributes,
            None | Some(Value::Null) => Map::new(),
            Some(other) => {
                warn!("Ignoring non-object pivot attributes {}", other);
                Map::new()
            }
        };
        let model = match map.remove("model").as_ref().and_then(numeric_key) {
            Some(id) => self.find(&id)?,
            None => None,
        };
        Ok(StagedPivot::new(model, attributes))
    }

    fn find(&self, id: &Number) -> PivotResult<Option<R>> {
        let found = self
            .inner
            .config
            .finder
            .find_one(id)
            .map_err(PivotError::storage)?;
        if found.is_none() {
            debug!("No {} record with key {}", self.related_table(), id);
        }
        Ok(found)
    }

    fn related_table(&self) -> String {
        self.inner.config.finder.table_schema().table
    }

    /// Primary-key condition for a related record, built from `data`.
    pub fn related_condition(&self, data: &PivotAttributes) -> PrimaryKey {
        pivot_condition(&self.inner.config.finder.table_schema(), data)
    }

    /// Writes the staged pivots of `attribute` for `owner`.
    ///
    /// Registered as the lifecycle listener; may also be called directly.
    pub fn save_pivots<H: Record>(&self, owner: &H, attribute: &str) -> PivotResult<()> {
        let config = &self.inner.config;
        let pivots = self.stored_pivots(attribute);

        let Some(host) = owner.pivots() else {
            return Err(PivotError::MissingCapability {
                type_name: owner.type_name().to_string(),
            });
        };

        let delete_first = config.delete_pivots_before_save && pivots.is_some();
        let pivots = pivots.unwrap_or_default();
        if config.inverse_insert_pivot {
            if let Some(model) = pivots
                .iter()
                .filter_map(|p| p.model.as_ref())
                .find(|m| m.pivots().is_none())
            {
                return Err(PivotError::MissingCapability {
                    type_name: model.type_name().to_string(),
                });
            }
        }

        if delete_first {
            // only the side this behavior writes; rows other hosts own stay
            let side = if config.inverse_insert_pivot {
                PivotSide::Related
            } else {
                PivotSide::Owner
            };
            host.delete_pivots(&config.relation, side)
                .map_err(PivotError::storage)?;
        }

        let mut inserted = 0usize;
        for pivot in &pivots {
            let Some(model) = &pivot.model else {
                continue;
            };
            if config.inverse_insert_pivot {
                if let Some(related) = model.pivots() {
                    related
                        .add_pivot(owner, &config.relation, &pivot.attributes)
                        .map_err(PivotError::storage)?;
                }
            } else {
                host.add_pivot(model, &config.relation, &pivot.attributes)
                    .map_err(PivotError::storage)?;
            }
            inserted += 1;
        }

        debug!(
            "Synced {} pivot(s) into {} for {} ({} unresolved)",
            inserted,
            config.relation,
            owner.type_name(),
            pivots.len() - inserted
        );
        Ok(())
    }
}

/// Maps each primary-key column of `schema` to its value in `data`, `null`
/// when missing.
pub fn pivot_condition(schema: &TableSchema, data: &PivotAttributes) -> PrimaryKey {
    schema
        .primary_key
        .iter()
        .map(|column| (column.clone(), data.get(column).cloned().unwrap_or(Value::Null)))
        .collect()
}
