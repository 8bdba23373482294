use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::{AsyncCommands, Script};

use keylock_cache::error::StoreError;
use keylock_cache::key::{format_key, format_key_with_prefix};
use keylock_cache::lock::{Lock, LockDescriptor};
use keylock_cache::store::{Store, effective_ttl};

use crate::config::RedisConfig;
use crate::error::map_redis_error;
use crate::lock::RedisLock;
use crate::scripts;

/// Convert a TTL to whole milliseconds for `PX`, never less than one.
pub(crate) fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1)
}

/// Redis-backed implementation of [`Store`].
///
/// Uses a `deadpool-redis` connection pool. Values are stored as plain Redis
/// strings and expire server-side with millisecond precision (`PX`).
///
/// # Key layout
///
/// Every key is rendered with [`format_key`]. The store prefix is applied
/// only to counters ([`Store::increment`] / [`Store::decrement`]) and lock
/// names, not to `get`/`put`/`add`/`forget`. Existing deployments depend on
/// this layout, so a counter written through `increment` is not visible
/// through `get` unless the prefix is empty.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    prefix: String,
}

impl RedisStore {
    /// Create a new `RedisStore` from the provided configuration.
    ///
    /// No connection is opened until the first command.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the pool cannot be created.
    pub fn new(config: &RedisConfig) -> Result<Self, StoreError> {
        let cfg = Config::from_url(&config.url);
        let pool = cfg
            .builder()
            .map(|b| {
                b.max_size(config.pool_size)
                    .wait_timeout(Some(config.connection_timeout))
                    .runtime(Runtime::Tokio1)
                    .build()
            })
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        tracing::debug!(url = %config.url, prefix = %config.prefix, "redis store created");
        Ok(Self {
            pool,
            prefix: config.prefix.clone(),
        })
    }

    /// Wire key for plain entries.
    fn item_key(key: &str) -> String {
        format_key(key)
    }

    /// Wire key for counters.
    fn counter_key(&self, key: &str) -> String {
        format_key_with_prefix(&self.prefix, key)
    }

    /// Wire key for a lock record.
    fn lock_key(&self, name: &str) -> String {
        format_key_with_prefix(&self.prefix, name)
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
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.get(Self::item_key(key))
            .await
            .map_err(|e| map_redis_error(&e))
    }

    async fn many(&self, keys: &[&str]) -> Result<Vec<(String, Option<String>)>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let rendered: Vec<String> = keys.iter().map(|key| Self::item_key(key)).collect();
        let mut conn = self.conn().await?;
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&rendered)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error(&e))?;

        Ok(keys
            .iter()
            .map(|key| (*key).to_owned())
            .zip(values)
            .collect())
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool, StoreError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(Self::item_key(key)).arg(value);
        if let Some(ttl) = effective_ttl(ttl) {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }

        let mut conn = self.conn().await?;
        let () = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error(&e))?;
        Ok(true)
    }

    async fn put_many(
        &self,
        entries: &[(&str, &str)],
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        if entries.is_empty() {
            return Ok(true);
        }

        let ttl = effective_ttl(ttl).map(ttl_millis);
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in entries {
            pipe.cmd("SET").arg(Self::item_key(key)).arg(*value);
            if let Some(ms) = ttl {
                pipe.arg("PX").arg(ms);
            }
            pipe.ignore();
        }

        let mut conn = self.conn().await?;
        pipe.exec_async(&mut conn)
            .await
            .map_err(|e| map_redis_error(&e))?;
        Ok(true)
    }

    async fn add(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool, StoreError> {
        let ttl_ms = effective_ttl(ttl).map_or(0, ttl_millis);

        let mut conn = self.conn().await?;
        let script = Script::new(scripts::ADD);
        let result: i64 = script
            .key(Self::item_key(key))
            .arg(value)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| map_redis_error(&e))?;

        Ok(result == 1)
    }

    fn supports_atomic_add(&self) -> bool {
        true
    }

    /// `INCRBY` on the prefixed key. A missing key starts from zero.
    async fn increment(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;
        conn.incr(self.counter_key(key), delta)
            .await
            .map_err(|e| map_redis_error(&e))
    }

    /// `DECRBY` on the prefixed key. A missing key starts from zero.
    async fn decrement(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let mut conn = self.conn().await?;
        conn.decr(self.counter_key(key), delta)
            .await
            .map_err(|e| map_redis_error(&e))
    }

    /// Always `true` once `DEL` has been dispatched, whether or not the key
    /// existed.
    async fn forget(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let _: i64 = conn
            .del(Self::item_key(key))
            .await
            .map_err(|e| map_redis_error(&e))?;
        Ok(true)
    }

    /// `FLUSHDB`: clears the whole logical database, not only prefixed keys.
    async fn flush(&self) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let () = redis::cmd("FLUSHDB")
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error(&e))?;
        Ok(true)
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn lock(&self, name: &str, seconds: u64, owner: Option<String>) -> Box<dyn Lock> {
        Box::new(RedisLock::new(
            self.pool.clone(),
            self.lock_key(name),
            LockDescriptor::new(name, seconds, owner),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_prefix(prefix: &str) -> RedisStore {
        RedisStore::new(&RedisConfig {
            prefix: prefix.to_owned(),
            ..RedisConfig::default()
        })
        .expect("pool creation does not connect")
    }

    #[test]
    fn ttl_millis_rounds_up_to_one() {
        assert_eq!(ttl_millis(Duration::from_micros(200)), 1);
        assert_eq!(ttl_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(ttl_millis(Duration::from_secs(60)), 60_000);
    }

    #[test]
    fn plain_keys_are_formatted_without_prefix() {
        assert_eq!(RedisStore::item_key("catalog/item\\7"), "CATALOG_ITEM_7");
    }

    // Counters carry the prefix while plain entries do not. This pins the
    // existing wire layout.
    #[tokio::test]
    async fn counter_and_lock_keys_carry_prefix() {
        let store = store_with_prefix("app:");
        assert_eq!(store.counter_key("hits/today"), "app:HITS_TODAY");
        assert_eq!(store.lock_key("job:42"), "app:JOB:42");
        assert_ne!(store.counter_key("hits"), RedisStore::item_key("hits"));
        assert_eq!(store.prefix(), "app:");
    }

    #[tokio::test]
    async fn lock_keeps_caller_name() {
        let store = store_with_prefix("app:");
        let lock = store.lock("job:42", 10, Some("worker-1".into()));
        assert_eq!(lock.name(), "job:42");
        assert_eq!(lock.owner(), "worker-1");
        assert_eq!(lock.seconds(), 10);
    }

    #[tokio::test]
    async fn empty_many_skips_the_server() {
        let store = store_with_prefix("");
        assert!(store.many(&[]).await.unwrap().is_empty());
        assert!(store.put_many(&[], None).await.unwrap());
    }
}

#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use keylock_cache::testing::{run_flush_conformance_test, run_store_conformance_tests};

    use super::*;

    fn test_config(prefix: String) -> RedisConfig {
        RedisConfig {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            prefix,
            ..RedisConfig::default()
        }
    }

    #[tokio::test]
    async fn store_conformance() {
        // Counters are prefixed and plain keys are not, so the shared suite
        // runs with an empty prefix.
        let store = RedisStore::new(&test_config(String::new())).expect("pool creation should succeed");
        run_store_conformance_tests(&store)
            .await
            .expect("conformance tests should pass");
    }

    #[tokio::test]
    #[ignore = "FLUSHDB wipes the target database"]
    async fn flush_conformance() {
        let store = RedisStore::new(&test_config(String::new())).expect("pool creation should succeed");
        run_flush_conformance_test(&store)
            .await
            .expect("flush conformance should pass");
    }

    #[tokio::test]
    async fn increment_uses_prefixed_key() {
        let prefix = format!("keylock-test-{}:", uuid::Uuid::new_v4());
        let store = RedisStore::new(&test_config(prefix)).expect("pool creation should succeed");

        assert_eq!(store.increment("visits", 5).await.unwrap(), 5);
        assert_eq!(store.decrement("visits", 2).await.unwrap(), 3);
        assert!(
            store.get("visits").await.unwrap().is_none(),
            "plain get does not see the prefixed counter"
        );
    }

    #[tokio::test]
    async fn put_expires_server_side() {
        let store = RedisStore::new(&test_config(String::new())).expect("pool creation should succeed");
        let key = format!("ttl-{}", uuid::Uuid::new_v4());

        store
            .put(&key, "v", Some(Duration::from_millis(200)))
            .await
            .unwrap();
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(store.get(&key).await.unwrap().is_none());
    }
}
