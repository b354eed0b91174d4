use crate::error::StoreError;
use crate::store::PivotStore;
use pivotsave_model::{
    ActiveRecord, BoxError, Events, ModelFinder, PivotAttributes, PivotCapable, PivotError,
    PivotRelation, PivotResult, PivotSide, PrimaryKey, Record, TableSchema,
};
use serde_json::{Map, Number, Value};
use std::fmt;

/// A generic record stored in the entity table.
///
/// The `data` field holds arbitrary JSON; its top-level keys act as the
/// record's attributes. `entity_type` doubles as the table name on pivot rows.
pub struct Entity {
    id: Option<i64>,
    pub entity_type: String,
    pub data: Value,
    store: PivotStore,
    events: Events<Entity>,
}

impl Entity {
    /// A new, not yet inserted entity.
    pub fn new(store: &PivotStore, entity_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: None,
            entity_type: entity_type.into(),
            data,
            store: store.clone(),
            events: Events::new(),
        }
    }

    fn loaded(store: &PivotStore, entity_type: &str, id: i64, data: Value) -> Self {
        Self {
            id: Some(id),
            entity_type: entity_type.to_string(),
            data,
            store: store.clone(),
            events: Events::new(),
        }
    }

    /// Inserts a new entity right away and returns it.
    pub fn create(
        store: &PivotStore,
        entity_type: impl Into<String>,
        data: Value,
    ) -> PivotResult<Self> {
        let mut entity = Self::new(store, entity_type, data);
        entity.save()?;
        Ok(entity)
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn store(&self) -> &PivotStore {
        &self.store
    }

    /// Pending lifecycle listeners.
    pub fn events(&self) -> &Events<Entity> {
        &self.events
    }

    /// Extract a string value from `data` using a JSON pointer (e.g., "/title").
    pub fn get_str(&self, pointer: &str) -> Option<&str> {
        self.data.pointer(pointer).and_then(|v| v.as_str())
    }
}

/// Clones carry the stored state only; pending listeners stay with the original.
impl Clone for Entity {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            entity_type: self.entity_type.clone(),
            data: self.data.clone(),
            store: self.store.clone(),
            events: Events::new(),
        }
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.entity_type == other.entity_type && self.data == other.data
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("entity_type", &self.entity_type)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

impl Record for Entity {
    fn table_name(&self) -> &str {
        &self.entity_type
    }

    fn primary_key(&self) -> PrimaryKey {
        let mut key = PrimaryKey::new();
        key.insert("id".to_string(), self.id.map_or(Value::Null, Value::from));
        key
    }

    fn pivots(&self) -> Option<&dyn PivotCapable> {
        Some(self)
    }
}

impl PivotCapable for Entity {
    fn add_pivot(
        &self,
        related: &dyn Record,
        relation: &PivotRelation,
        attributes: &PivotAttributes,
    ) -> Result<(), BoxError> {
        self.store.add_pivot(relation, self, related, attributes)?;
        Ok(())
    }

    fn delete_pivots(&self, relation: &PivotRelation, side: PivotSide) -> Result<(), BoxError> {
        self.store.delete_pivots(relation, self, side)?;
        Ok(())
    }
}

impl ActiveRecord for Entity {
    fn is_new_record(&self) -> bool {
        self.id.is_none()
    }

    fn insert(&mut self) -> Result<(), BoxError> {
        let id = self.store.insert_entity(&self.entity_type, &self.data)?;
        self.id = Some(id);
        Ok(())
    }

    fn update(&mut self) -> Result<(), BoxError> {
        let id = self.id.ok_or_else(|| {
            StoreError::InvalidData(format!("{} was never inserted", self.entity_type))
        })?;
        self.store.update_entity(&self.entity_type, id, &self.data)?;
        Ok(())
    }

    fn events_mut(&mut self) -> &mut Events<Self> {
        &mut self.events
    }

    fn set_attribute(&mut self, name: &str, value: Value) -> PivotResult<()> {
        if !self.data.is_object() {
            self.data = Value::Object(Map::new());
        }
        if let Value::Object(fields) = &mut self.data {
            fields.insert(name.to_string(), value);
        }
        Ok(())
    }

    fn get_attribute(&self, name: &str) -> PivotResult<Value> {
        if name == "id" {
            return Ok(self.id.map_or(Value::Null, Value::from));
        }
        self.data
            .get(name)
            .cloned()
            .ok_or_else(|| PivotError::UnknownProperty {
                type_name: self.type_name().to_string(),
                name: name.to_string(),
            })
    }
}

/// Looks up entities of one type by id.
#[derive(Clone)]
pub struct EntityFinder {
    store: PivotStore,
    entity_type: String,
}

impl EntityFinder {
    pub fn new(store: &PivotStore, entity_type: impl Into<String>) -> Self {
        Self {
            store: store.clone(),
            entity_type: entity_type.into(),
        }
    }
}

impl ModelFinder<Entity> for EntityFinder {
    fn find_one(&self, id: &Number) -> Result<Option<Entity>, BoxError> {
        // a fractional key cannot match an INTEGER primary key
        let whole = id
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64);
        let Some(id) = id.as_i64().or(whole) else {
            return Ok(None);
        };
        let found = self.store.find_entity(&self.entity_type, id)?;
        Ok(found.map(|data| Entity::loaded(&self.store, &self.entity_type, id, data)))
    }

    fn table_schema(&self) -> TableSchema {
        TableSchema::new(self.entity_type.clone(), &["id"])
    }
}
