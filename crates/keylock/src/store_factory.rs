use std::sync::Arc;
#[cfg(any(feature = "redis", feature = "memcached"))]
use std::time::Duration;

use keylock_cache::error::StoreError;
use keylock_cache::store::Store;
use keylock_file::FileStore;
#[cfg(feature = "memcached")]
use keylock_memcached::{MemcachedConfig, MemcachedStore};
use keylock_memory::MemoryStore;
#[cfg(feature = "redis")]
use keylock_redis::{RedisConfig, RedisStore};

use crate::config::StoreConfig;

/// Construct a store from its configuration.
///
/// Networked stores open no connection here; the first command does.
pub fn create_store(config: &StoreConfig) -> Result<Arc<dyn Store>, StoreError> {
    match config.driver.as_str() {
        "array" | "memory" => Ok(Arc::new(MemoryStore::new())),
        "file" => create_file(config),
        #[cfg(feature = "redis")]
        "redis" => create_redis(config),
        #[cfg(feature = "memcached")]
        "memcached" => create_memcached(config),
        other => Err(StoreError::InvalidConfig(format!(
            "unsupported cache driver: {other} (is the feature enabled?)"
        ))),
    }
}

fn create_file(config: &StoreConfig) -> Result<Arc<dyn Store>, StoreError> {
    let path = config
        .path
        .as_deref()
        .ok_or_else(|| StoreError::InvalidConfig("file driver requires 'path'".into()))?;
    Ok(Arc::new(FileStore::new(path)))
}

#[cfg(feature = "redis")]
fn create_redis(config: &StoreConfig) -> Result<Arc<dyn Store>, StoreError> {
    let mut redis_config = RedisConfig::new(
        config
            .url
            .as_deref()
            .unwrap_or("redis://127.0.0.1:6379"),
    );
    if let Some(prefix) = &config.prefix {
        redis_config.prefix.clone_from(prefix);
    }
    if let Some(pool_size) = config.pool_size {
        redis_config.pool_size = pool_size;
    }
    if let Some(ms) = config.connection_timeout_ms {
        redis_config.connection_timeout = Duration::from_millis(ms);
    }
    Ok(Arc::new(RedisStore::new(&redis_config)?))
}

#[cfg(feature = "memcached")]
fn create_memcached(config: &StoreConfig) -> Result<Arc<dyn Store>, StoreError> {
    let mut memcached_config = MemcachedConfig::default();
    if let Some(url) = &config.url {
        memcached_config.url.clone_from(url);
    }
    if let Some(prefix) = &config.prefix {
        memcached_config.prefix.clone_from(prefix);
    }
    if let Some(pool_size) = config.pool_size {
        memcached_config.pool_size = pool_size;
    }
    if let Some(ms) = config.connection_timeout_ms {
        memcached_config.connection_timeout = Duration::from_millis(ms);
    }
    Ok(Arc::new(MemcachedStore::new(&memcached_config)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn array_and_memory_are_in_process() {
        for driver in ["array", "memory"] {
            let store = create_store(&StoreConfig::new(driver)).unwrap();
            assert!(store.supports_atomic_add());
            store.put("k", "v", None).await.unwrap();
            assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        }
    }

    #[tokio::test]
    async fn file_driver_uses_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            path: Some(dir.path().display().to_string()),
            ..StoreConfig::new("file")
        };

        let store = create_store(&config).unwrap();
        assert!(!store.supports_atomic_add());
        store.forever("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn file_driver_requires_path() {
        let err = create_store(&StoreConfig::new("file")).err().unwrap();
        assert!(matches!(err, StoreError::InvalidConfig(_)));
    }

    #[test]
    fn unknown_driver_is_rejected() {
        let err = create_store(&StoreConfig::new("dynamodb")).err().unwrap();
        match err {
            StoreError::InvalidConfig(msg) => assert!(msg.contains("dynamodb")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(feature = "redis")]
    #[tokio::test]
    async fn redis_driver_applies_prefix() {
        let config = StoreConfig {
            url: Some("redis://127.0.0.1:6379".into()),
            prefix: Some("app:".into()),
            pool_size: Some(2),
            connection_timeout_ms: Some(100),
            ..StoreConfig::new("redis")
        };
        let store = create_store(&config).unwrap();
        assert_eq!(store.prefix(), "app:");
        assert!(store.supports_atomic_add());
    }

    #[cfg(feature = "memcached")]
    #[tokio::test]
    async fn memcached_driver_applies_prefix() {
        let config = StoreConfig {
            url: Some("memcache://127.0.0.1:11211".into()),
            prefix: Some("app:".into()),
            ..StoreConfig::new("memcached")
        };
        let store = create_store(&config).unwrap();
        assert_eq!(store.prefix(), "app:");
        assert!(store.supports_atomic_add());
    }
}
