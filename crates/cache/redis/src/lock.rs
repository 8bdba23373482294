//! Redis-backed locks.
//!
//! # How It Works
//!
//! - **acquire** with a TTL issues `SET key owner EX seconds NX`; without a
//!   TTL it issues `SETNX key owner`, and the record lives until released.
//!   Both are a single atomic command.
//! - **release** runs a Lua script that deletes the key only if it still
//!   holds this lock's owner token. Checking and deleting in one server-side
//!   step keeps a holder whose record expired (and was re-acquired by someone
//!   else) from deleting the new holder's record.
//! - **force release** is a plain `DEL`.
//!
//! # Guarantees
//!
//! Against a single Redis instance at most one owner holds a given name at a
//! time, provided the TTL outlasts the critical section. With Sentinel or
//! Cluster, replication is asynchronous and a failover right after an
//! acquire can lose the record, letting a second owner in.

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::{AsyncCommands, Script};

use keylock_cache::error::StoreError;
use keylock_cache::lock::{Lock, LockDescriptor};

use crate::error::map_redis_error;
use crate::scripts;

/// A lock whose record is a Redis string holding the owner token.
///
/// Obtained from [`RedisStore::lock`](keylock_cache::Store::lock). See the
/// [module-level documentation](self) for consistency guarantees.
pub struct RedisLock {
    pool: Pool,
    redis_key: String,
    descriptor: LockDescriptor,
}

impl RedisLock {
    pub(crate) fn new(pool: Pool, redis_key: String, descriptor: LockDescriptor) -> Self {
        Self {
            pool,
            redis_key,
            descriptor,
        }
    }

    /// The wire key of the lock record.
    pub fn redis_key(&self) -> &str {
        &self.redis_key
    }

    /// Obtain a connection from the pool.
    async fn conn(&self) -> Result<deadpool_redis::Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

#[async_trait]
impl Lock for RedisLock {
    fn descriptor(&self) -> &LockDescriptor {
        &self.descriptor
    }

    async fn acquire(&self) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;

        let acquired = if self.seconds() > 0 {
            let reply: Option<String> = redis::cmd("SET")
                .arg(&self.redis_key)
                .arg(self.owner())
                .arg("EX")
                .arg(self.seconds())
                .arg("NX")
                .query_async(&mut conn)
                .await
                .map_err(|e| map_redis_error(&e))?;
            reply.is_some()
        } else {
            conn.set_nx(&self.redis_key, self.owner())
                .await
                .map_err(|e| map_redis_error(&e))?
        };

        tracing::debug!(lock = %self.redis_key, owner = %self.owner(), acquired, "redis lock acquire");
        Ok(acquired)
    }

    async fn release(&self) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;

        let script = Script::new(scripts::LOCK_RELEASE);
        let result: i64 = script
            .key(&self.redis_key)
            .arg(self.owner())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| map_redis_error(&e))?;

        let released = result == 1;
        if !released {
            tracing::warn!(lock = %self.redis_key, owner = %self.owner(), "release refused, not the owner");
        }
        Ok(released)
    }

    async fn force_release(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: i64 = conn
            .del(&self.redis_key)
            .await
            .map_err(|e| map_redis_error(&e))?;
        Ok(())
    }

    async fn current_owner(&self) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.get(&self.redis_key)
            .await
            .map_err(|e| map_redis_error(&e))
    }
}
