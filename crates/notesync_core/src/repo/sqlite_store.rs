//! SQLite-backed object store.
//!
//! # Responsibility
//! - Persist records as JSON payload rows keyed by `(namespace, key)`.
//! - Enforce optimistic concurrency with conditional revision updates.
//!
//! # Invariants
//! - Every write runs in an immediate transaction.
//! - `revision` in storage only ever increases.

use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::path::Path;

use crate::db::{ensure_schema, open_db, open_db_in_memory};
use crate::model::field_path::FieldPath;
use crate::model::record::{Record, RecordId, RecordPayload};
use crate::repo::gateway::{GatewayError, GatewayResult, ObjectGateway, SaveRecord};
use crate::repo::handle::{HandleRegistry, MutableHandle};

const OBJECT_SELECT_SQL: &str = "SELECT
    namespace,
    key,
    type,
    name,
    revision,
    modified,
    payload
FROM objects
WHERE namespace = ?1 AND key = ?2;";

/// `ObjectGateway` over one SQLite connection.
pub struct SqliteObjectStore {
    conn: Mutex<Connection>,
    handles: HandleRegistry,
}

impl SqliteObjectStore {
    /// Wraps a connection that already has migrations applied.
    pub fn try_new(conn: Connection) -> GatewayResult<Self> {
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            handles: HandleRegistry::new(),
        })
    }

    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> GatewayResult<Self> {
        Self::try_new(open_db(path)?)
    }

    /// Opens (and migrates) a private in-memory database.
    pub fn open_in_memory() -> GatewayResult<Self> {
        Self::try_new(open_db_in_memory()?)
    }

    /// Seeds or overwrites one record, bypassing revision checks.
    pub fn insert(&self, record: &Record) -> GatewayResult<Record> {
        record.validate_field_keys()?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut stored = record.clone();
        stored.revision = load_revision(&tx, &record.identifier)?.unwrap_or(0);
        stored.mark_saved();
        upsert_record(&tx, &stored)?;
        tx.commit()?;
        drop(conn);

        self.handles.publish(&stored);
        Ok(stored)
    }

    pub fn get(&self, identifier: &RecordId) -> GatewayResult<Option<Record>> {
        let conn = self.conn.lock();
        load_record(&conn, identifier)
    }

    pub fn handles(&self) -> &HandleRegistry {
        &self.handles
    }

    pub fn live_handle_count(&self) -> usize {
        self.handles.live_handle_count()
    }
}

#[async_trait]
impl SaveRecord for SqliteObjectStore {
    type Error = GatewayError;

    async fn save(&self, record: &Record) -> GatewayResult<Record> {
        record.validate_field_keys()?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let actual_revision = load_revision(&tx, &record.identifier)?.unwrap_or(0);
        if actual_revision != record.revision {
            return Err(if actual_revision == 0 {
                GatewayError::NotFound(record.identifier.clone())
            } else {
                GatewayError::Conflict {
                    identifier: record.identifier.clone(),
                    expected_revision: record.revision,
                    actual_revision,
                }
            });
        }

        let mut saved = record.clone();
        saved.mark_saved();
        if actual_revision == 0 {
            insert_record(&tx, &saved)?;
        } else {
            update_record_if_revision(&tx, &saved, actual_revision)?;
        }
        tx.commit()?;
        drop(conn);

        debug!(
            "event=object_save module=repo store=sqlite status=ok id={} revision={}",
            saved.identifier, saved.revision
        );
        self.handles.publish(&saved);
        Ok(saved)
    }
}

#[async_trait]
impl ObjectGateway for SqliteObjectStore {
    async fn get_mutable(&self, identifier: &RecordId) -> GatewayResult<MutableHandle> {
        let record = self
            .get(identifier)?
            .ok_or_else(|| GatewayError::NotFound(identifier.clone()))?;
        Ok(self.handles.open(record))
    }

    fn to_mutable(&self, record: &Record) -> MutableHandle {
        self.handles.open(record.clone())
    }

    fn destroy_mutable(&self, handle: &MutableHandle) {
        self.handles.release(handle);
    }

    fn mutate(
        &self,
        handle: &MutableHandle,
        path: &FieldPath,
        value: serde_json::Value,
    ) -> GatewayResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut updated = load_record(&tx, handle.identifier())?
            .ok_or_else(|| GatewayError::NotFound(handle.identifier().clone()))?;
        let base_revision = updated.revision;
        updated.apply_field(path, value)?;
        updated.mark_saved();
        update_record_if_revision(&tx, &updated, base_revision)?;
        tx.commit()?;
        drop(conn);

        debug!(
            "event=object_mutate module=repo store=sqlite status=ok id={} path={} revision={}",
            updated.identifier, path, updated.revision
        );
        self.handles.publish(&updated);
        Ok(())
    }
}

fn load_record(conn: &Connection, identifier: &RecordId) -> GatewayResult<Option<Record>> {
    let mut stmt = conn.prepare(OBJECT_SELECT_SQL)?;
    let mut rows = stmt.query(params![identifier.namespace, identifier.key])?;
    match rows.next()? {
        Some(row) => parse_record_row(row).map(Some),
        None => Ok(None),
    }
}

fn load_revision(tx: &Transaction<'_>, identifier: &RecordId) -> GatewayResult<Option<u64>> {
    let revision: Option<i64> = tx
        .query_row(
            "SELECT revision FROM objects WHERE namespace = ?1 AND key = ?2;",
            params![identifier.namespace, identifier.key],
            |row| row.get(0),
        )
        .optional()?;
    revision.map(revision_from_sql).transpose()
}

fn insert_record(tx: &Transaction<'_>, record: &Record) -> GatewayResult<()> {
    tx.execute(
        "INSERT INTO objects (namespace, key, type, name, revision, modified, payload)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
        params![
            record.identifier.namespace,
            record.identifier.key,
            record.type_key,
            record.name,
            revision_to_sql(record.revision)?,
            record.modified,
            serde_json::to_string(&record.payload)?,
        ],
    )?;
    Ok(())
}

fn upsert_record(tx: &Transaction<'_>, record: &Record) -> GatewayResult<()> {
    tx.execute(
        "INSERT INTO objects (namespace, key, type, name, revision, modified, payload)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT (namespace, key) DO UPDATE SET
            type = excluded.type,
            name = excluded.name,
            revision = excluded.revision,
            modified = excluded.modified,
            payload = excluded.payload;",
        params![
            record.identifier.namespace,
            record.identifier.key,
            record.type_key,
            record.name,
            revision_to_sql(record.revision)?,
            record.modified,
            serde_json::to_string(&record.payload)?,
        ],
    )?;
    Ok(())
}

fn update_record_if_revision(
    tx: &Transaction<'_>,
    record: &Record,
    expected_revision: u64,
) -> GatewayResult<()> {
    let changed = tx.execute(
        "UPDATE objects
         SET
            type = ?3,
            name = ?4,
            revision = ?5,
            modified = ?6,
            payload = ?7
         WHERE namespace = ?1
           AND key = ?2
           AND revision = ?8;",
        params![
            record.identifier.namespace,
            record.identifier.key,
            record.type_key,
            record.name,
            revision_to_sql(record.revision)?,
            record.modified,
            serde_json::to_string(&record.payload)?,
            revision_to_sql(expected_revision)?,
        ],
    )?;

    if changed == 0 {
        let actual_revision = load_revision(tx, &record.identifier)?
            .ok_or_else(|| GatewayError::NotFound(record.identifier.clone()))?;
        return Err(GatewayError::Conflict {
            identifier: record.identifier.clone(),
            expected_revision,
            actual_revision,
        });
    }

    Ok(())
}

fn parse_record_row(row: &Row<'_>) -> GatewayResult<Record> {
    let payload_json: String = row.get("payload")?;
    let payload: RecordPayload = serde_json::from_str(&payload_json)?;
    Ok(Record {
        identifier: RecordId::new(
            row.get::<_, String>("namespace")?,
            row.get::<_, String>("key")?,
        ),
        type_key: row.get("type")?,
        name: row.get("name")?,
        modified: row.get("modified")?,
        revision: revision_from_sql(row.get("revision")?)?,
        payload,
    })
}

fn revision_to_sql(revision: u64) -> GatewayResult<i64> {
    i64::try_from(revision)
        .map_err(|_| GatewayError::InvalidData(format!("revision {revision} exceeds i64 range")))
}

fn revision_from_sql(revision: i64) -> GatewayResult<u64> {
    u64::try_from(revision).map_err(|_| {
        GatewayError::InvalidData(format!("negative revision `{revision}` in objects.revision"))
    })
}
