#![allow(dead_code)]

use async_trait::async_trait;
use notesync_core::{
    AnnotationPayload, Entry, FieldPath, GatewayError, GatewayResult, HandleId,
    InMemoryObjectStore, MutableHandle, NotebookConfiguration, ObjectGateway, Record, RecordId,
    SaveRecord,
};
use parking_lot::Mutex;

/// Failure injected into the next `save` call.
#[derive(Debug, Clone)]
pub enum InjectedFailure {
    /// Reported as a conflict against the revision currently stored.
    Conflict,
    Transport(String),
}

/// In-memory gateway that records every call made through it.
#[derive(Default)]
pub struct RecordingGateway {
    pub store: InMemoryObjectStore,
    saves: Mutex<Vec<Record>>,
    mutations: Mutex<Vec<(String, serde_json::Value)>>,
    acquired: Mutex<Vec<HandleId>>,
    released: Mutex<Vec<HandleId>>,
    next_failure: Mutex<Option<InjectedFailure>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_save(&self, failure: InjectedFailure) {
        *self.next_failure.lock() = Some(failure);
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().len()
    }

    pub fn mutations(&self) -> Vec<(String, serde_json::Value)> {
        self.mutations.lock().clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.mutations.lock().len()
    }

    pub fn acquired(&self) -> Vec<HandleId> {
        self.acquired.lock().clone()
    }

    pub fn released(&self) -> Vec<HandleId> {
        self.released.lock().clone()
    }

    /// Every acquired handle released exactly once, nothing else released.
    pub fn assert_handles_balanced(&self) {
        let mut acquired = self.acquired();
        let mut released = self.released();
        acquired.sort();
        released.sort();
        assert_eq!(acquired, released, "acquired and released handles differ");
        assert_eq!(self.store.live_handle_count(), 0, "live handles leaked");
    }
}

#[async_trait]
impl SaveRecord for RecordingGateway {
    type Error = GatewayError;

    async fn save(&self, record: &Record) -> GatewayResult<Record> {
        self.saves.lock().push(record.clone());
        let injected = self.next_failure.lock().take();
        if let Some(failure) = injected {
            return Err(match failure {
                InjectedFailure::Conflict => GatewayError::Conflict {
                    identifier: record.identifier.clone(),
                    expected_revision: record.revision,
                    actual_revision: self
                        .store
                        .get(&record.identifier)
                        .map_or(0, |stored| stored.revision),
                },
                InjectedFailure::Transport(message) => GatewayError::Transport(message),
            });
        }
        self.store.save(record).await
    }
}

#[async_trait]
impl ObjectGateway for RecordingGateway {
    async fn get_mutable(&self, identifier: &RecordId) -> GatewayResult<MutableHandle> {
        let handle = self.store.get_mutable(identifier).await?;
        self.acquired.lock().push(handle.id());
        Ok(handle)
    }

    fn to_mutable(&self, record: &Record) -> MutableHandle {
        let handle = self.store.to_mutable(record);
        self.acquired.lock().push(handle.id());
        handle
    }

    fn destroy_mutable(&self, handle: &MutableHandle) {
        self.released.lock().push(handle.id());
        self.store.destroy_mutable(handle);
    }

    fn mutate(
        &self,
        handle: &MutableHandle,
        path: &FieldPath,
        value: serde_json::Value,
    ) -> GatewayResult<()> {
        self.mutations.lock().push((path.to_string(), value.clone()));
        self.store.mutate(handle, path, value)
    }
}

pub fn entry(id: &str, text: &str) -> Entry {
    Entry::with_id(id, text, 1_700_000_000_000)
}

pub fn notebook(key: &str, pages: &[(&str, &str, Vec<Entry>)]) -> Record {
    let mut configuration = NotebookConfiguration::new();
    for (section, page, entries) in pages {
        configuration.set_page(section, page, entries.clone());
    }
    Record::notebook(RecordId::new("test", key), key, configuration)
}

pub fn annotation(key: &str, targets: &[(&str, &str)], tags: &[&str]) -> Record {
    let mut payload = AnnotationPayload::new().with_tags(tags.iter().copied());
    for (target_id, entry_id) in targets {
        payload = payload.with_target(*target_id, *entry_id);
    }
    Record::annotation(RecordId::new("test", key), key, payload)
}

pub fn page_ids(record: &Record, section: &str, page: &str) -> Vec<String> {
    record
        .notebook_configuration()
        .and_then(|configuration| configuration.page(section, page))
        .map(|entries| entries.iter().map(|entry| entry.id.clone()).collect())
        .unwrap_or_default()
}

pub fn page_texts(record: &Record, section: &str, page: &str) -> Vec<String> {
    record
        .notebook_configuration()
        .and_then(|configuration| configuration.page(section, page))
        .map(|entries| entries.iter().map(|entry| entry.text.clone()).collect())
        .unwrap_or_default()
}

pub fn tags_of(record: &Record) -> Vec<String> {
    record
        .annotation_payload()
        .map(|payload| payload.tags.clone())
        .unwrap_or_default()
}

/// Seeds `record`, then lets a competing writer save `competing` on top, and
/// returns the stale copy the first writer still holds.
pub async fn stale_after_competing_save<G: ObjectGateway>(
    gateway: &G,
    seeded: &Record,
    competing: impl FnOnce(&mut Record),
) -> Record {
    let stale = gateway.save(seeded).await.expect("seed save should succeed");
    let mut winner = stale.clone();
    competing(&mut winner);
    gateway.save(&winner).await.expect("competing save should succeed");
    stale
}
