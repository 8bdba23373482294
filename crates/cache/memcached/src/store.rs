use std::time::Duration;

use async_trait::async_trait;

use keylock_cache::error::StoreError;
use keylock_cache::key::{format_key, format_key_with_prefix};
use keylock_cache::lock::{Lock, LockDescriptor};
use keylock_cache::store::{Store, effective_ttl};

use crate::config::MemcachedConfig;
use crate::lock::MemcachedLock;
use crate::pool::{ConnectionPool, PooledConnection, build_pool, checkout};
use crate::protocol::StoreVerb;

/// Longest expiry Memcached reads as relative seconds; larger values are
/// taken as absolute unix timestamps.
const MAX_RELATIVE_EXPIRATION: u64 = 60 * 60 * 24 * 30;

/// Convert a TTL to a Memcached expiration field. `0` never expires.
///
/// Memcached has whole-second resolution, so partial seconds round up.
pub(crate) fn expiration(ttl: Option<Duration>) -> u32 {
    let Some(ttl) = effective_ttl(ttl) else {
        return 0;
    };
    let seconds = ttl
        .as_secs()
        .saturating_add(u64::from(ttl.subsec_nanos() > 0));

    if seconds <= MAX_RELATIVE_EXPIRATION {
        return u32::try_from(seconds).unwrap_or(u32::MAX);
    }
    let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
    u32::try_from(now.saturating_add(seconds)).unwrap_or(u32::MAX)
}

/// Memcached-backed implementation of [`Store`].
///
/// Expiry is enforced by the server. `add` maps onto the native atomic
/// `add` command.
///
/// # Key layout
///
/// Keys are rendered with [`format_key`]; counters and lock names
/// additionally carry the store prefix, plain entries do not. This matches
/// the layout of the Redis store.
///
/// # Counters
///
/// `incr`/`decr` only work on existing numeric values. Incrementing a missing
/// key fails with [`StoreError::NotFound`] and decrementing clamps at zero,
/// both unlike the in-process and Redis stores.
#[derive(Clone)]
pub struct MemcachedStore {
    pool: ConnectionPool,
    prefix: String,
}

impl MemcachedStore {
    /// Create a new `MemcachedStore` from the provided configuration.
    ///
    /// No connection is opened until the first command.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the pool cannot be created.
    pub fn new(config: &MemcachedConfig) -> Result<Self, StoreError> {
        let pool = build_pool(config)?;
        tracing::debug!(addr = %config.address(), prefix = %config.prefix, "memcached store created");
        Ok(Self {
            pool,
            prefix: config.prefix.clone(),
        })
    }

    fn counter_key(&self, key: &str) -> String {
        format_key_with_prefix(&self.prefix, key)
    }

    fn lock_key(&self, name: &str) -> String {
        format_key_with_prefix(&self.prefix, name)
    }

    async fn conn(&self) -> Result<PooledConnection, StoreError> {
        checkout(&self.pool).await
    }

    /// Apply a signed delta with `incr` or `decr`.
    async fn adjust(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let rendered = self.counter_key(key);
        let amount = delta.unsigned_abs();

        let mut conn = self.conn().await?;
        let value = if delta >= 0 {
            conn.incr(&rendered, amount).await?
        } else {
            conn.decr(&rendered, amount).await?
        };

        let value = value.ok_or_else(|| StoreError::NotFound(rendered.clone()))?;
        i64::try_from(value)
            .map_err(|_| StoreError::Serialization(format!("counter {rendered} exceeds i64")))
    }
}

#[async_trait]
impl Store for MemcachedStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.get(&format_key(key)).await
    }

    async fn many(&self, keys: &[&str]) -> Result<Vec<(String, Option<String>)>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let rendered: Vec<String> = keys.iter().map(|key| format_key(key)).collect();
        let mut conn = self.conn().await?;
        let found = conn.get_multi(&rendered).await?;

        // Distinct caller keys can share a wire key, so look values up
        // without consuming them.
        Ok(keys
            .iter()
            .zip(&rendered)
            .map(|(key, wire)| ((*key).to_owned(), found.get(wire).cloned()))
            .collect())
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        conn.store(StoreVerb::Set, &format_key(key), value, expiration(ttl))
            .await
    }

    async fn put_many(
        &self,
        entries: &[(&str, &str)],
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let exptime = expiration(ttl);
        let mut conn = self.conn().await?;

        let mut all_stored = true;
        for (key, value) in entries {
            all_stored &= conn
                .store(StoreVerb::Set, &format_key(key), value, exptime)
                .await?;
        }
        Ok(all_stored)
    }

    async fn add(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        conn.store(StoreVerb::Add, &format_key(key), value, expiration(ttl))
            .await
    }

    fn supports_atomic_add(&self) -> bool {
        true
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.adjust(key, delta).await
    }

    async fn decrement(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.adjust(key, delta.saturating_neg()).await
    }

    /// Always `true` once `delete` has been dispatched, whether or not the
    /// key existed.
    async fn forget(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        conn.delete(&format_key(key)).await?;
        Ok(true)
    }

    /// `flush_all`: invalidates every item on the server.
    async fn flush(&self) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        conn.flush_all().await?;
        Ok(true)
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn lock(&self, name: &str, seconds: u64, owner: Option<String>) -> Box<dyn Lock> {
        Box::new(MemcachedLock::new(
            self.pool.clone(),
            self.lock_key(name),
            LockDescriptor::new(name, seconds, owner),
        ))
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
    use tokio::net::TcpListener;

    use super::*;

    fn store_with_prefix(prefix: &str) -> MemcachedStore {
        MemcachedStore::new(&MemcachedConfig {
            prefix: prefix.to_owned(),
            ..MemcachedConfig::default()
        })
        .expect("pool creation does not connect")
    }

    #[test]
    fn expiration_is_relative_up_to_thirty_days() {
        assert_eq!(expiration(None), 0);
        assert_eq!(expiration(Some(Duration::ZERO)), 0);
        assert_eq!(expiration(Some(Duration::from_millis(1))), 1);
        assert_eq!(expiration(Some(Duration::from_millis(1500))), 2);
        assert_eq!(expiration(Some(Duration::from_secs(60))), 60);
        assert_eq!(
            expiration(Some(Duration::from_secs(MAX_RELATIVE_EXPIRATION))),
            2_592_000
        );
    }

    #[test]
    fn long_expiration_becomes_absolute_timestamp() {
        let ttl = Duration::from_secs(MAX_RELATIVE_EXPIRATION + 1);
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap();

        let exptime = u64::from(expiration(Some(ttl)));
        assert!(exptime >= now + MAX_RELATIVE_EXPIRATION + 1);
        assert!(exptime <= now + MAX_RELATIVE_EXPIRATION + 10);
    }

    #[test]
    fn huge_expiration_saturates() {
        assert_eq!(expiration(Some(Duration::MAX)), u32::MAX);
        assert_eq!(expiration(Some(Duration::from_secs(u64::MAX))), u32::MAX);
    }

    // Counters and locks carry the prefix while plain entries do not. This
    // pins the existing wire layout.
    #[tokio::test]
    async fn counter_and_lock_keys_carry_prefix() {
        let store = store_with_prefix("app:");
        assert_eq!(store.counter_key("hits/today"), "app:HITS_TODAY");
        assert_eq!(store.lock_key("job:42"), "app:JOB:42");
        assert_eq!(store.prefix(), "app:");
    }

    #[tokio::test]
    async fn many_fills_every_key_sharing_a_wire_key() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut socket = BufStream::new(socket);
            let mut request = String::new();
            socket.read_line(&mut request).await.unwrap();
            socket
                .write_all(b"VALUE A_B 0 1\r\nx\r\nEND\r\n")
                .await
                .unwrap();
            socket.flush().await.unwrap();
            request
        });

        let store = MemcachedStore::new(&MemcachedConfig::new(addr.to_string())).unwrap();
        let found = store.many(&["a/b", "A_B"]).await.unwrap();

        assert_eq!(
            found,
            vec![
                ("a/b".to_owned(), Some("x".to_owned())),
                ("A_B".to_owned(), Some("x".to_owned())),
            ]
        );
        assert_eq!(server.await.unwrap(), "get A_B A_B\r\n");
    }

    #[tokio::test]
    async fn lock_keeps_caller_name() {
        let store = store_with_prefix("app:");
        let lock = store.lock("job:42", 10, Some("worker-1".into()));
        assert_eq!(lock.name(), "job:42");
        assert_eq!(lock.owner(), "worker-1");
    }
}
