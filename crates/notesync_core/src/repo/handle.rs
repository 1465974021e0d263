//! Live working copies and their subscription registry.
//!
//! # Responsibility
//! - Hand out uniquely numbered `MutableHandle`s bound to one identifier.
//! - Refresh every live handle when the store publishes a newer record.
//! - Detach handles on release.
//!
//! # Invariants
//! - A handle is not `Clone`; exactly one owner releases it.
//! - Releasing an already released handle is a no-op.

use log::warn;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::model::record::{Record, RecordId, RecordKind};

/// Process-unique handle number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleId(u64);

impl HandleId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl Display for HandleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Live, observable working copy of one record.
#[derive(Debug)]
pub struct MutableHandle {
    id: HandleId,
    identifier: RecordId,
    state: Arc<RwLock<Record>>,
    released: AtomicBool,
}

impl MutableHandle {
    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn identifier(&self) -> &RecordId {
        &self.identifier
    }

    /// Deep copy of the current working state.
    pub fn snapshot(&self) -> Record {
        self.state.read().clone()
    }

    pub fn kind(&self) -> RecordKind {
        self.state.read().kind()
    }

    pub fn revision(&self) -> u64 {
        self.state.read().revision
    }

    /// Applies an unsaved local edit to the working copy.
    pub fn edit<R>(&self, edit: impl FnOnce(&mut Record) -> R) -> R {
        let mut state = self.state.write();
        edit(&mut *state)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Returns `true` only for the first call.
    fn mark_released(&self) -> bool {
        !self.released.swap(true, Ordering::AcqRel)
    }
}

#[derive(Debug)]
struct Subscription {
    identifier: RecordId,
    state: Arc<RwLock<Record>>,
}

/// Subscription bookkeeping shared by store implementations.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    next_id: AtomicU64,
    live: Mutex<BTreeMap<HandleId, Subscription>>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps `record` as a live handle subscribed to store updates.
    pub fn open(&self, record: Record) -> MutableHandle {
        let id = HandleId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let identifier = record.identifier.clone();
        let state = Arc::new(RwLock::new(record));
        self.live.lock().insert(
            id,
            Subscription {
                identifier: identifier.clone(),
                state: Arc::clone(&state),
            },
        );

        MutableHandle {
            id,
            identifier,
            state,
            released: AtomicBool::new(false),
        }
    }

    /// Detaches `handle` from store updates.
    ///
    /// Returns `false` when the handle was already released or belongs to
    /// another registry.
    pub fn release(&self, handle: &MutableHandle) -> bool {
        if !handle.mark_released() {
            warn!(
                "event=handle_release module=repo status=skipped reason=already_released handle={}",
                handle.id
            );
            return false;
        }

        let removed = self.live.lock().remove(&handle.id).is_some();
        if !removed {
            warn!(
                "event=handle_release module=repo status=skipped reason=unknown_handle handle={}",
                handle.id
            );
        }
        removed
    }

    /// Pushes `record` into every live handle bound to its identifier.
    ///
    /// Returns the number of refreshed handles.
    pub fn publish(&self, record: &Record) -> usize {
        let live = self.live.lock();
        let mut refreshed = 0;
        for subscription in live.values() {
            if subscription.identifier == record.identifier {
                *subscription.state.write() = record.clone();
                refreshed += 1;
            }
        }
        refreshed
    }

    pub fn live_handle_count(&self) -> usize {
        self.live.lock().len()
    }

    pub fn live_handles_for(&self, identifier: &RecordId) -> usize {
        self.live
            .lock()
            .values()
            .filter(|subscription| &subscription.identifier == identifier)
            .count()
    }
}
