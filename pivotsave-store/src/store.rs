//! Persistent storage for pivot rows and the entities they link.

use crate::error::{StoreError, StoreResult};
use pivotsave_model::{PivotAttributes, PivotRelation, PivotSide, PrimaryKey, Record};
use rusqlite::{Connection, params};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// One stored link of a pivot relation.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotRow {
    pub id: i64,
    pub relation: PivotRelation,
    pub owner_table: String,
    pub owner_key: PrimaryKey,
    pub related_table: String,
    pub related_key: PrimaryKey,
    pub attributes: PivotAttributes,
}

/// Pivot and entity store backed by SQLite. Clones share the connection.
#[derive(Clone)]
pub struct PivotStore {
    conn: Arc<Mutex<Connection>>,
}

impl PivotStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS entities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_type TEXT NOT NULL,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS pivots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                relation TEXT NOT NULL,
                owner_table TEXT NOT NULL,
                owner_key TEXT NOT NULL,
                related_table TEXT NOT NULL,
                related_key TEXT NOT NULL,
                attributes TEXT NOT NULL,
                UNIQUE(relation, owner_table, owner_key, related_table, related_key)
            );

            CREATE INDEX IF NOT EXISTS pivots_related
                ON pivots (relation, related_table, related_key);
            ",
        )?;
        Ok(())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    // ── Pivots ───────────────────────────────────────────────────

    /// Inserts a row linking `owner` to `related`. Returns the row id.
    pub fn add_pivot(
        &self,
        relation: &PivotRelation,
        owner: &dyn Record,
        related: &dyn Record,
        attributes: &PivotAttributes,
    ) -> StoreResult<i64> {
        let owner_key = encode_key(owner)?;
        let related_key = encode_key(related)?;
        let attributes = serde_json::to_string(attributes)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO pivots
                 (relation, owner_table, owner_key, related_table, related_key, attributes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                relation.as_str(),
                owner.table_name(),
                owner_key,
                related.table_name(),
                related_key,
                attributes,
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(
            "Linked {}{} -> {}{} in {}",
            owner.table_name(),
            owner_key,
            related.table_name(),
            related_key,
            relation
        );
        Ok(id)
    }

    /// Deletes the rows of `relation` in which `record` sits on `side`.
    pub fn delete_pivots(
        &self,
        relation: &PivotRelation,
        record: &dyn Record,
        side: PivotSide,
    ) -> StoreResult<usize> {
        let key = encode_key(record)?;
        let sql = match side {
            PivotSide::Owner => {
                "DELETE FROM pivots WHERE relation = ?1 AND owner_table = ?2 AND owner_key = ?3"
            }
            PivotSide::Related => {
                "DELETE FROM pivots WHERE relation = ?1 AND related_table = ?2 AND related_key = ?3"
            }
        };
        let conn = self.lock()?;
        let deleted = conn.execute(sql, params![relation.as_str(), record.table_name(), key])?;
        debug!(
            "Deleted {} pivot(s) of {}{} as {} from {}",
            deleted,
            record.table_name(),
            key,
            side,
            relation
        );
        Ok(deleted)
    }

    /// Rows of `relation` owned by `record`, in insertion order.
    pub fn pivots_for(
        &self,
        relation: &PivotRelation,
        record: &dyn Record,
    ) -> StoreResult<Vec<PivotRow>> {
        let key = encode_key(record)?;
        self.query_rows(
            "SELECT id, relation, owner_table, owner_key, related_table, related_key, attributes
             FROM pivots WHERE relation = ?1 AND owner_table = ?2 AND owner_key = ?3 ORDER BY id",
            params![relation.as_str(), record.table_name(), key],
        )
    }

    /// All rows of `relation`, in insertion order.
    pub fn list_pivots(&self, relation: &PivotRelation) -> StoreResult<Vec<PivotRow>> {
        self.query_rows(
            "SELECT id, relation, owner_table, owner_key, related_table, related_key, attributes
             FROM pivots WHERE relation = ?1 ORDER BY id",
            params![relation.as_str()],
        )
    }

    /// Returns the number of rows in `relation`.
    pub fn count_pivots(&self, relation: &PivotRelation) -> StoreResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pivots WHERE relation = ?1",
            params![relation.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn query_rows(&self, sql: &str, params: impl rusqlite::Params) -> StoreResult<Vec<PivotRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let raw = stmt
            .query_map(params, |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(
                |(id, relation, owner_table, owner_key, related_table, related_key, attributes)|
                 -> StoreResult<PivotRow> {
                    Ok(PivotRow {
                        id,
                        relation: PivotRelation::new(relation),
                        owner_table,
                        owner_key: serde_json::from_str(&owner_key)?,
                        related_table,
                        related_key: serde_json::from_str(&related_key)?,
                        attributes: serde_json::from_str(&attributes)?,
                    })
                },
            )
            .collect()
    }

    // ── Entities ─────────────────────────────────────────────────

    /// Inserts an entity and returns its generated id.
    pub fn insert_entity(&self, entity_type: &str, data: &Value) -> StoreResult<i64> {
        let data = serde_json::to_string(data)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO entities (entity_type, data) VALUES (?1, ?2)",
            params![entity_type, data],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Overwrites the data of an existing entity.
    pub fn update_entity(&self, entity_type: &str, id: i64, data: &Value) -> StoreResult<()> {
        let data = serde_json::to_string(data)?;
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE entities SET data = ?1 WHERE id = ?2 AND entity_type = ?3",
            params![data, id, entity_type],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("{entity_type}#{id}")));
        }
        Ok(())
    }

    /// Loads the data of an entity, `None` if there is no such entity.
    pub fn find_entity(&self, entity_type: &str, id: i64) -> StoreResult<Option<Value>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT data FROM entities WHERE id = ?1 AND entity_type = ?2")?;
        let mut rows = stmt.query(params![id, entity_type])?;
        match rows.next()? {
            Some(row) => {
                let data: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }
}

fn encode_key(record: &dyn Record) -> StoreResult<String> {
    let key = record.primary_key();
    if key.is_empty() || key.values().any(Value::is_null) {
        return Err(StoreError::InvalidData(format!(
            "{} has no primary key yet",
            record.type_name()
        )));
    }
    Ok(serde_json::to_string(&key)?)
}
