//! In-process per-identifier serialization of managed saves.
//!
//! Live working copies are refreshed by every store write, so two saves of
//! the same record from this process would otherwise overwrite each other's
//! unsaved local state before merging. Cross-process ordering is still left
//! to the store.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::model::record::RecordId;

#[derive(Debug, Default)]
pub struct IdentifierLocks {
    locks: Mutex<HashMap<RecordId, Arc<AsyncMutex<()>>>>,
}

impl IdentifierLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other holder of `identifier` remains.
    pub async fn acquire(&self, identifier: &RecordId) -> IdentifierLease<'_> {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(identifier.clone()).or_default())
        };
        let guard = lock.lock_owned().await;
        IdentifierLease {
            owner: self,
            identifier: identifier.clone(),
            guard: Some(guard),
        }
    }

    /// Number of identifiers currently held or awaited.
    pub fn tracked(&self) -> usize {
        self.locks.lock().len()
    }
}

/// Exclusive hold on one identifier; released on drop.
pub struct IdentifierLease<'a> {
    owner: &'a IdentifierLocks,
    identifier: RecordId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IdentifierLease<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.owner.locks.lock();
        let idle = locks
            .get(&self.identifier)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(&self.identifier);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::IdentifierLocks;
    use crate::model::record::RecordId;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn lease_is_exclusive_per_identifier_and_cleaned_up() {
        let locks = Arc::new(IdentifierLocks::new());
        let id = RecordId::new("test", "nb");

        let first = locks.acquire(&id).await;
        let other = locks.acquire(&RecordId::new("test", "other")).await;
        assert_eq!(locks.tracked(), 2);

        let contender = {
            let locks = Arc::clone(&locks);
            let id = id.clone();
            tokio::spawn(async move {
                let _lease = locks.acquire(&id).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(first);
        contender.await.unwrap();
        drop(other);
        assert_eq!(locks.tracked(), 0);
    }
}
