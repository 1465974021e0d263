//! In-process object store with revision-based optimistic concurrency.

use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use std::collections::BTreeMap;

use crate::model::field_path::FieldPath;
use crate::model::record::{Record, RecordId};
use crate::repo::gateway::{GatewayError, GatewayResult, ObjectGateway, SaveRecord};
use crate::repo::handle::{HandleRegistry, MutableHandle};

/// `ObjectGateway` backed by a process-local map.
///
/// Writes to one identifier are serialized by the map lock, which stands in
/// for the per-record write ordering a real store provides.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    records: Mutex<BTreeMap<RecordId, Record>>,
    handles: HandleRegistry,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds or overwrites one record, bypassing revision checks.
    ///
    /// Returns the stored copy with its bumped revision.
    pub fn insert(&self, mut record: Record) -> Record {
        let mut records = self.records.lock();
        record.revision = records
            .get(&record.identifier)
            .map_or(0, |stored| stored.revision);
        record.mark_saved();
        records.insert(record.identifier.clone(), record.clone());
        drop(records);

        self.handles.publish(&record);
        record
    }

    pub fn get(&self, identifier: &RecordId) -> Option<Record> {
        self.records.lock().get(identifier).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn handles(&self) -> &HandleRegistry {
        &self.handles
    }

    pub fn live_handle_count(&self) -> usize {
        self.handles.live_handle_count()
    }
}

#[async_trait]
impl SaveRecord for InMemoryObjectStore {
    type Error = GatewayError;

    async fn save(&self, record: &Record) -> GatewayResult<Record> {
        record.validate_field_keys()?;
        let mut records = self.records.lock();
        let actual_revision = records
            .get(&record.identifier)
            .map_or(0, |stored| stored.revision);
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
        records.insert(saved.identifier.clone(), saved.clone());
        drop(records);

        debug!(
            "event=object_save module=repo store=memory status=ok id={} revision={}",
            saved.identifier, saved.revision
        );
        self.handles.publish(&saved);
        Ok(saved)
    }
}

#[async_trait]
impl ObjectGateway for InMemoryObjectStore {
    async fn get_mutable(&self, identifier: &RecordId) -> GatewayResult<MutableHandle> {
        let record = self
            .get(identifier)
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
        let mut records = self.records.lock();
        let stored = records
            .get_mut(handle.identifier())
            .ok_or_else(|| GatewayError::NotFound(handle.identifier().clone()))?;

        let mut updated = stored.clone();
        updated.apply_field(path, value)?;
        updated.mark_saved();
        *stored = updated.clone();
        drop(records);

        debug!(
            "event=object_mutate module=repo store=memory status=ok id={} path={} revision={}",
            updated.identifier, path, updated.revision
        );
        self.handles.publish(&updated);
        Ok(())
    }
}
