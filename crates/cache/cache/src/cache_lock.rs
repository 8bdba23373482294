use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::lock::{Lock, LockDescriptor};
use crate::store::Store;

/// A lock built purely from [`Store`] operations, usable on any backend.
///
/// Atomicity depends on the store:
///
/// - **acquire** uses [`Store::add`] when the store reports
///   [`Store::supports_atomic_add`] and the lock has a TTL. Otherwise it
///   checks for an existing record with `get` and then writes with
///   `put`/`forever`. That fallback is not atomic and is only suitable for
///   stores where concurrent writers are not a concern, such as a
///   single-process file cache.
/// - **release** reads the stored owner and then forgets the key. Another
///   owner can acquire in between if the record expires at that moment.
/// - **force release** is a plain `forget`.
pub struct CacheLock {
    store: Arc<dyn Store>,
    descriptor: LockDescriptor,
}

impl CacheLock {
    pub fn new(store: Arc<dyn Store>, descriptor: LockDescriptor) -> Self {
        Self { store, descriptor }
    }
}

#[async_trait]
impl Lock for CacheLock {
    fn descriptor(&self) -> &LockDescriptor {
        &self.descriptor
    }

    async fn acquire(&self) -> Result<bool, StoreError> {
        let LockDescriptor { name, owner, .. } = &self.descriptor;
        let ttl = self.descriptor.ttl();

        let acquired = if self.store.supports_atomic_add() && ttl.is_some() {
            self.store.add(name, owner, ttl).await?
        } else if self.store.get(name).await?.is_some() {
            false
        } else if ttl.is_some() {
            self.store.put(name, owner, ttl).await?
        } else {
            self.store.forever(name, owner).await?
        };

        tracing::debug!(lock = %name, owner = %owner, acquired, "cache lock acquire");
        Ok(acquired)
    }

    async fn release(&self) -> Result<bool, StoreError> {
        if !self.is_owned_by_current_process().await? {
            tracing::warn!(lock = %self.name(), owner = %self.owner(), "release refused, not the owner");
            return Ok(false);
        }
        self.store.forget(self.name()).await
    }

    async fn force_release(&self) -> Result<(), StoreError> {
        self.store.forget(self.name()).await?;
        Ok(())
    }

    async fn current_owner(&self) -> Result<Option<String>, StoreError> {
        self.store.get(self.name()).await
    }
}
