//! Cache stores and locks behind one configuration.
//!
//! [`CacheManager`] turns a [`CacheConfig`] into named [`Store`]s. Each store
//! hands out [`Lock`]s that use the same backend, so the choice of driver
//! decides both where values live and how mutual exclusion is enforced:
//!
//! | driver      | store              | lock            | cross-process |
//! |-------------|--------------------|-----------------|---------------|
//! | `array`     | [`MemoryStore`]    | [`MemoryLock`]  | no            |
//! | `redis`     | `RedisStore`       | `RedisLock`     | yes           |
//! | `memcached` | `MemcachedStore`   | `MemcachedLock` | yes           |
//! | `file`      | [`FileStore`]      | [`FileLock`]    | no            |
//!
//! ```ignore
//! use keylock::{CacheConfig, CacheManager, LockExt};
//!
//! let manager = CacheManager::new(CacheConfig::from_file("cache.toml")?);
//! let lock = manager.lock("reports:nightly", 60, None)?;
//! lock.block_with(Duration::from_secs(5), || async { build_report().await }).await?;
//! ```

mod config;
mod manager;
mod store_factory;

pub use config::{CacheConfig, StoreConfig};
pub use manager::CacheManager;
pub use store_factory::create_store;

pub use keylock_cache::{
    CacheLock, DEFAULT_BLOCK_INTERVAL, Lock, LockDescriptor, LockExt, Store, StoreError,
    TaggableStore, generate_owner,
};
pub use keylock_file::{FileLock, FileStore};
pub use keylock_memory::{MemoryLock, MemoryStore};

#[cfg(feature = "memcached")]
pub use keylock_memcached::{MemcachedConfig, MemcachedLock, MemcachedStore};
#[cfg(feature = "redis")]
pub use keylock_redis::{RedisConfig, RedisLock, RedisStore};
