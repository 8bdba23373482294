use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use keylock_cache::error::StoreError;
use keylock_cache::lock::{Lock, LockDescriptor};

/// Internal entry representing a held lock.
#[derive(Debug, Clone)]
pub(crate) struct LockRecord {
    owner: String,
    expires_at: Option<Instant>,
}

impl LockRecord {
    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Lock table shared by a [`MemoryStore`](crate::MemoryStore) and its locks.
pub(crate) type LockTable = Arc<DashMap<String, LockRecord>>;

/// In-process [`Lock`] backed by the owning store's lock table.
///
/// Acquire and release are atomic with respect to other tasks and threads
/// of the same process. Expired records are evicted lazily on the next
/// acquire for the same name.
#[derive(Debug)]
pub struct MemoryLock {
    locks: LockTable,
    descriptor: LockDescriptor,
}

impl MemoryLock {
    pub(crate) fn new(locks: LockTable, descriptor: LockDescriptor) -> Self {
        Self { locks, descriptor }
    }
}

#[async_trait]
impl Lock for MemoryLock {
    fn descriptor(&self) -> &LockDescriptor {
        &self.descriptor
    }

    async fn acquire(&self) -> Result<bool, StoreError> {
        let name = self.name();

        // Remove expired entries lazily.
        self.locks.remove_if(name, |_, record| record.is_expired());

        let acquired = match self.locks.entry(name.to_owned()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(LockRecord {
                    owner: self.owner().to_owned(),
                    expires_at: self
                        .descriptor
                        .ttl()
                        .and_then(|ttl| Instant::now().checked_add(ttl)),
                });
                true
            }
        };

        tracing::debug!(lock = %name, owner = %self.owner(), acquired, "memory lock acquire");
        Ok(acquired)
    }

    async fn release(&self) -> Result<bool, StoreError> {
        // Only remove if we are still the owner of a live record.
        let released = self
            .locks
            .remove_if(self.name(), |_, record| {
                record.owner == self.owner() && !record.is_expired()
            })
            .is_some();

        if !released {
            tracing::warn!(lock = %self.name(), owner = %self.owner(), "release refused, not the owner");
        }
        Ok(released)
    }

    async fn force_release(&self) -> Result<(), StoreError> {
        self.locks.remove(self.name());
        Ok(())
    }

    async fn current_owner(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .locks
            .get(self.name())
            .filter(|record| !record.is_expired())
            .map(|record| record.owner.clone()))
    }
}
