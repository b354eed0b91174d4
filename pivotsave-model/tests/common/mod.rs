//! In-memory hosts and related records that log pivot writes.

#![allow(dead_code)]

use pivotsave_model::{
    ActiveRecord, BoxError, Events, ModelFinder, PivotAttributes, PivotCapable, PivotError,
    PivotRelation, PivotResult, PivotSide, PrimaryKey, Record, TableSchema,
};
use serde_json::{Number, Value};
use std::cell::RefCell;
use std::rc::Rc;

pub use pivotsave_model::PivotSaveConfig as Config;

/// A pivot write observed by the fakes.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Delete {
        record: String,
        relation: String,
        side: PivotSide,
    },
    Add {
        owner: String,
        related: String,
        relation: String,
        attributes: PivotAttributes,
    },
}

pub type Log = Rc<RefCell<Vec<Op>>>;

pub fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn label(record: &dyn Record) -> String {
    let key = record.primary_key();
    let id = key.get("id").cloned().unwrap_or(Value::Null);
    format!("{}#{}", record.table_name(), id)
}

fn add(
    log: &Log,
    owner: &dyn Record,
    related: &dyn Record,
    relation: &PivotRelation,
    attributes: &PivotAttributes,
) {
    log.borrow_mut().push(Op::Add {
        owner: label(owner),
        related: label(related),
        relation: relation.to_string(),
        attributes: attributes.clone(),
    });
}

fn delete(log: &Log, record: &dyn Record, relation: &PivotRelation, side: PivotSide) {
    log.borrow_mut().push(Op::Delete {
        record: label(record),
        relation: relation.to_string(),
        side,
    });
}

// ── Related record ───────────────────────────────────────────────

/// Related record; pivot capable only when it carries a log.
#[derive(Debug, Clone)]
pub struct Tag {
    pub id: i64,
    pub log: Option<Log>,
}

impl Tag {
    pub fn new(id: i64) -> Self {
        Self { id, log: None }
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Record for Tag {
    fn table_name(&self) -> &str {
        "tags"
    }

    fn primary_key(&self) -> PrimaryKey {
        PrimaryKey::from([("id".to_string(), Value::from(self.id))])
    }

    fn pivots(&self) -> Option<&dyn PivotCapable> {
        self.log.as_ref().map(|_| self as &dyn PivotCapable)
    }
}

impl PivotCapable for Tag {
    fn add_pivot(
        &self,
        related: &dyn Record,
        relation: &PivotRelation,
        attributes: &PivotAttributes,
    ) -> Result<(), BoxError> {
        if let Some(log) = &self.log {
            add(log, self, related, relation, attributes);
        }
        Ok(())
    }

    fn delete_pivots(&self, relation: &PivotRelation, side: PivotSide) -> Result<(), BoxError> {
        if let Some(log) = &self.log {
            delete(log, self, relation, side);
        }
        Ok(())
    }
}

/// Finds tags among a fixed set of ids.
pub struct TagFinder {
    pub existing: Vec<i64>,
    /// Log handed to found tags, making them pivot capable.
    pub log: Option<Log>,
    pub fail: bool,
}

impl TagFinder {
    pub fn with(existing: &[i64]) -> Rc<Self> {
        Rc::new(Self {
            existing: existing.to_vec(),
            log: None,
            fail: false,
        })
    }
}

impl ModelFinder<Tag> for TagFinder {
    fn find_one(&self, id: &Number) -> Result<Option<Tag>, BoxError> {
        if self.fail {
            return Err(Box::new(std::io::Error::other("tags table is gone")));
        }
        Ok(id
            .as_i64()
            .filter(|id| self.existing.contains(id))
            .map(|id| Tag {
                id,
                log: self.log.clone(),
            }))
    }

    fn table_schema(&self) -> TableSchema {
        TableSchema::new("tags", &["id"])
    }
}

// ── Host records ─────────────────────────────────────────────────

/// Pivot-capable host.
pub struct Post {
    pub id: Option<i64>,
    pub title: String,
    pub log: Log,
    /// Inserting a pivot to this tag id fails.
    pub fail_on: Option<i64>,
    pub events: Events<Post>,
}

impl Post {
    pub fn new(log: &Log) -> Self {
        Self {
            id: None,
            title: String::new(),
            log: Rc::clone(log),
            fail_on: None,
            events: Events::new(),
        }
    }

    pub fn existing(log: &Log, id: i64) -> Self {
        Self {
            id: Some(id),
            ..Self::new(log)
        }
    }
}

impl Record for Post {
    fn table_name(&self) -> &str {
        "posts"
    }

    fn primary_key(&self) -> PrimaryKey {
        PrimaryKey::from([("id".to_string(), self.id.map_or(Value::Null, Value::from))])
    }

    fn pivots(&self) -> Option<&dyn PivotCapable> {
        Some(self)
    }
}

impl PivotCapable for Post {
    fn add_pivot(
        &self,
        related: &dyn Record,
        relation: &PivotRelation,
        attributes: &PivotAttributes,
    ) -> Result<(), BoxError> {
        let related_id = related.primary_key().get("id").and_then(Value::as_i64);
        if related_id.is_some() && related_id == self.fail_on {
            return Err(Box::new(std::io::Error::other("UNIQUE constraint failed")));
        }
        add(&self.log, self, related, relation, attributes);
        Ok(())
    }

    fn delete_pivots(&self, relation: &PivotRelation, side: PivotSide) -> Result<(), BoxError> {
        delete(&self.log, self, relation, side);
        Ok(())
    }
}

impl ActiveRecord for Post {
    fn is_new_record(&self) -> bool {
        self.id.is_none()
    }

    fn insert(&mut self) -> Result<(), BoxError> {
        self.id = Some(1);
        Ok(())
    }

    fn update(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    fn events_mut(&mut self) -> &mut Events<Self> {
        &mut self.events
    }

    fn set_attribute(&mut self, name: &str, value: Value) -> PivotResult<()> {
        match (name, value) {
            ("title", Value::String(title)) => {
                self.title = title;
                Ok(())
            }
            (name, _) => Err(PivotError::UnknownProperty {
                type_name: self.type_name().to_string(),
                name: name.to_string(),
            }),
        }
    }

    fn get_attribute(&self, name: &str) -> PivotResult<Value> {
        match name {
            "title" => Ok(Value::from(self.title.clone())),
            _ => Err(PivotError::UnknownProperty {
                type_name: self.type_name().to_string(),
                name: name.to_string(),
            }),
        }
    }
}

/// Host without pivot capability.
#[derive(Default)]
pub struct Draft {
    pub id: Option<i64>,
    pub events: Events<Draft>,
}

impl Record for Draft {
    fn table_name(&self) -> &str {
        "drafts"
    }

    fn primary_key(&self) -> PrimaryKey {
        PrimaryKey::from([("id".to_string(), self.id.map_or(Value::Null, Value::from))])
    }
}

impl ActiveRecord for Draft {
    fn is_new_record(&self) -> bool {
        self.id.is_none()
    }

    fn insert(&mut self) -> Result<(), BoxError> {
        self.id = Some(1);
        Ok(())
    }

    fn update(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    fn events_mut(&mut self) -> &mut Events<Self> {
        &mut self.events
    }
}

pub fn tags_config(finder: Rc<TagFinder>) -> Config<Tag> {
    let finder: Rc<dyn ModelFinder<Tag>> = finder;
    Config::new("tags", finder, "post_tag")
}
