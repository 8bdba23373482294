//! Memcached-backed locks.
//!
//! Acquisition is a native `add`, which the server applies atomically, with
//! the lock TTL as the item expiry. Release reads the record and deletes it
//! when it still holds this lock's owner token. The read and the delete are
//! two round trips, so a record that expires in between and is re-acquired by
//! another owner can be deleted by the stale holder.

use async_trait::async_trait;

use keylock_cache::error::StoreError;
use keylock_cache::lock::{Lock, LockDescriptor};

use crate::pool::{ConnectionPool, PooledConnection, checkout};
use crate::protocol::StoreVerb;
use crate::store::expiration;

/// A lock whose record is a Memcached item holding the owner token.
pub struct MemcachedLock {
    pool: ConnectionPool,
    memcached_key: String,
    descriptor: LockDescriptor,
}

impl MemcachedLock {
    pub(crate) fn new(
        pool: ConnectionPool,
        memcached_key: String,
        descriptor: LockDescriptor,
    ) -> Self {
        Self {
            pool,
            memcached_key,
            descriptor,
        }
    }

    /// The wire key of the lock record.
    pub fn memcached_key(&self) -> &str {
        &self.memcached_key
    }

    async fn conn(&self) -> Result<PooledConnection, StoreError> {
        checkout(&self.pool).await
    }
}

#[async_trait]
impl Lock for MemcachedLock {
    fn descriptor(&self) -> &LockDescriptor {
        &self.descriptor
    }

    async fn acquire(&self) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let acquired = conn
            .store(
                StoreVerb::Add,
                &self.memcached_key,
                self.owner(),
                expiration(self.descriptor.ttl()),
            )
            .await?;

        tracing::debug!(lock = %self.memcached_key, owner = %self.owner(), acquired, "memcached lock acquire");
        Ok(acquired)
    }

    async fn release(&self) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;

        let holder = conn.get(&self.memcached_key).await?;
        if holder.as_deref() != Some(self.owner()) {
            tracing::warn!(lock = %self.memcached_key, owner = %self.owner(), "release refused, not the owner");
            return Ok(false);
        }

        conn.delete(&self.memcached_key).await?;
        tracing::debug!(lock = %self.memcached_key, owner = %self.owner(), "memcached lock released");
        Ok(true)
    }

    async fn force_release(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.delete(&self.memcached_key).await?;
        Ok(())
    }

    async fn current_owner(&self) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.get(&self.memcached_key).await
    }
}
