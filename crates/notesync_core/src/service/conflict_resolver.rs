//! Dispatches a save conflict to the merge strategy of the record kind.

use log::error;
use std::sync::Arc;

use crate::model::record::{Record, RecordKind};
use crate::repo::gateway::ObjectGateway;
use crate::repo::handle::MutableHandle;
use crate::service::entry_merge::EntryMerger;
use crate::service::merge::{MergeError, MergeOutcome, MergeResult};
use crate::service::tag_merge::TagMerger;

pub struct ConflictResolver<G: ObjectGateway + ?Sized> {
    entries: EntryMerger<G>,
    tags: TagMerger<G>,
}

impl<G: ObjectGateway + ?Sized> ConflictResolver<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self {
            entries: EntryMerger::new(Arc::clone(&gateway)),
            tags: TagMerger::new(gateway),
        }
    }

    /// Resolves a conflict for `original` using its local working copy.
    ///
    /// Unmanaged kinds fail fast; callers are expected to filter them.
    pub async fn resolve(
        &self,
        original: &Record,
        local: &MutableHandle,
    ) -> MergeResult<MergeOutcome> {
        match original.kind() {
            RecordKind::EntryCollection => self.entries.merge_entries(local).await,
            RecordKind::TagSet => self.tags.merge_tags(original, local).await,
            RecordKind::Unmanaged(type_key) => {
                error!(
                    "event=conflict_resolve module=service status=error id={} type={} error_code=unmanaged_kind",
                    original.identifier, type_key
                );
                Err(MergeError::UnmanagedKind(type_key))
            }
        }
    }
}
