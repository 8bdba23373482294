use std::sync::Arc;

use dashmap::DashMap;

use keylock_cache::error::StoreError;
use keylock_cache::lock::Lock;
use keylock_cache::store::Store;

use crate::config::CacheConfig;
use crate::store_factory::create_store;

/// Resolves named stores from a [`CacheConfig`].
///
/// A store is built the first time it is asked for and then shared: every
/// later call for the same name returns the same instance until it is
/// forgotten.
pub struct CacheManager {
    config: CacheConfig,
    resolved: DashMap<String, Arc<dyn Store>>,
}

impl CacheManager {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            resolved: DashMap::new(),
        }
    }

    /// The store named `name`, building it on first use.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidConfig`] when no store of that name is configured
    /// or its driver is unsupported.
    pub fn store(&self, name: &str) -> Result<Arc<dyn Store>, StoreError> {
        if let Some(store) = self.resolved.get(name) {
            return Ok(Arc::clone(store.value()));
        }

        let config = self.config.stores.get(name).ok_or_else(|| {
            StoreError::InvalidConfig(format!("cache store [{name}] is not defined"))
        })?;

        let store = self
            .resolved
            .entry(name.to_owned())
            .or_try_insert_with(|| {
                tracing::debug!(store = %name, driver = %config.driver, "resolving cache store");
                create_store(config)
            })?;
        Ok(Arc::clone(store.value()))
    }

    /// The store named by the configured default.
    pub fn default_store(&self) -> Result<Arc<dyn Store>, StoreError> {
        self.store(&self.config.default)
    }

    pub fn default_store_name(&self) -> &str {
        &self.config.default
    }

    /// Change which store [`CacheManager::default_store`] returns.
    pub fn set_default(&mut self, name: impl Into<String>) {
        self.config.default = name.into();
    }

    /// Drop the cached instance of `name`. The next lookup builds a fresh
    /// one. Returns whether an instance was cached.
    pub fn forget_store(&self, name: &str) -> bool {
        self.resolved.remove(name).is_some()
    }

    /// Drop every cached store instance.
    pub fn purge(&self) {
        self.resolved.clear();
    }

    /// Build a lock on the default store.
    pub fn lock(
        &self,
        name: &str,
        seconds: u64,
        owner: Option<String>,
    ) -> Result<Box<dyn Lock>, StoreError> {
        Ok(self.default_store()?.lock(name, seconds, owner))
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::StoreConfig;

    use super::*;

    fn manager(dir: &tempfile::TempDir) -> CacheManager {
        let mut config = CacheConfig::default();
        config.stores.insert(
            "file".into(),
            StoreConfig {
                path: Some(dir.path().display().to_string()),
                ..StoreConfig::new("file")
            },
        );
        config
            .stores
            .insert("broken".into(), StoreConfig::new("nosuchdriver"));
        CacheManager::new(config)
    }

    #[tokio::test]
    async fn same_name_resolves_to_same_instance() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);

        let first = manager.store("array").unwrap();
        first.put("shared", "yes", None).await.unwrap();

        let second = manager.store("array").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.get("shared").await.unwrap().as_deref(), Some("yes"));
    }

    #[tokio::test]
    async fn forget_store_rebuilds_instance() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);

        let first = manager.store("array").unwrap();
        first.put("k", "v", None).await.unwrap();

        assert!(manager.forget_store("array"));
        assert!(!manager.forget_store("array"));

        let rebuilt = manager.store("array").unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert!(rebuilt.get("k").await.unwrap().is_none());
    }

    #[test]
    fn purge_drops_all_instances() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);

        let array = manager.store("array").unwrap();
        let file = manager.store("file").unwrap();
        manager.purge();

        assert!(!Arc::ptr_eq(&array, &manager.store("array").unwrap()));
        assert!(!Arc::ptr_eq(&file, &manager.store("file").unwrap()));
    }

    #[tokio::test]
    async fn set_default_switches_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = manager(&dir);
        assert_eq!(manager.default_store_name(), "array");
        assert!(manager.default_store().unwrap().supports_atomic_add());

        manager.set_default("file");
        let store = manager.default_store().unwrap();
        assert!(!store.supports_atomic_add());
        assert!(Arc::ptr_eq(&store, &manager.store("file").unwrap()));
    }

    #[test]
    fn undefined_store_is_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);

        let err = manager.store("missing").err().unwrap();
        assert!(matches!(err, StoreError::InvalidConfig(_)));
    }

    #[test]
    fn failed_construction_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(&dir);

        assert!(manager.store("broken").is_err());
        assert!(!manager.forget_store("broken"));
    }

    #[tokio::test]
    async fn locks_come_from_default_store() {
        let manager = CacheManager::default();

        let lock = manager.lock("job:42", 10, Some("worker-1".into())).unwrap();
        assert!(lock.acquire().await.unwrap());

        let other = manager.lock("job:42", 10, Some("worker-2".into())).unwrap();
        assert!(!other.acquire().await.unwrap());
        assert!(lock.release().await.unwrap());
    }
}
