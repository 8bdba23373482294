use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use keylock_cache::error::StoreError;

/// Cache configuration: a set of named stores and the one used by default.
///
/// ```toml
/// default = "redis"
///
/// [stores.array]
/// driver = "array"
///
/// [stores.redis]
/// driver = "redis"
/// url = "redis://127.0.0.1:6379"
/// prefix = "app:"
///
/// [stores.file]
/// driver = "file"
/// path = "/var/cache/app"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Name of the store returned by
    /// [`CacheManager::default_store`](crate::CacheManager::default_store).
    #[serde(default = "default_store_name")]
    pub default: String,

    /// Store definitions keyed by name.
    #[serde(default)]
    pub stores: HashMap<String, StoreConfig>,
}

impl CacheConfig {
    /// Parse a TOML document.
    pub fn from_toml(source: &str) -> Result<Self, StoreError> {
        toml::from_str(source).map_err(|e| StoreError::InvalidConfig(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml(&source)
    }
}

impl Default for CacheConfig {
    /// A single in-process store named `array`.
    fn default() -> Self {
        let mut stores = HashMap::new();
        stores.insert(default_store_name(), StoreConfig::new("array"));
        Self {
            default: default_store_name(),
            stores,
        }
    }
}

fn default_store_name() -> String {
    "array".to_owned()
}

/// Configuration for one named store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// Backend: `"array"` (or `"memory"`), `"redis"`, `"memcached"` or
    /// `"file"`.
    pub driver: String,

    /// Server URL for the networked drivers.
    pub url: Option<String>,

    /// Prefix for counter and lock keys. Backend default when unset.
    pub prefix: Option<String>,

    /// Maximum pooled connections for the networked drivers.
    pub pool_size: Option<usize>,

    /// Connect and pool wait timeout in milliseconds.
    pub connection_timeout_ms: Option<u64>,

    /// Root directory for the `file` driver.
    pub path: Option<String>,
}

impl StoreConfig {
    /// A store definition with only the driver set.
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_document() {
        let config = CacheConfig::from_toml(
            r#"
            default = "redis"

            [stores.array]
            driver = "array"

            [stores.redis]
            driver = "redis"
            url = "redis://127.0.0.1:6379"
            prefix = "app:"
            pool_size = 4
            connection_timeout_ms = 250

            [stores.memcached]
            driver = "memcached"
            url = "127.0.0.1:11211"

            [stores.file]
            driver = "file"
            path = "/var/cache/app"
            "#,
        )
        .unwrap();

        assert_eq!(config.default, "redis");
        assert_eq!(config.stores.len(), 4);

        let redis = &config.stores["redis"];
        assert_eq!(redis.driver, "redis");
        assert_eq!(redis.url.as_deref(), Some("redis://127.0.0.1:6379"));
        assert_eq!(redis.prefix.as_deref(), Some("app:"));
        assert_eq!(redis.pool_size, Some(4));
        assert_eq!(redis.connection_timeout_ms, Some(250));

        assert_eq!(config.stores["file"].path.as_deref(), Some("/var/cache/app"));
        assert!(config.stores["array"].url.is_none());
    }

    #[test]
    fn default_name_when_omitted() {
        let config = CacheConfig::from_toml("[stores.array]\ndriver = \"array\"\n").unwrap();
        assert_eq!(config.default, "array");
    }

    #[test]
    fn empty_document_has_no_stores() {
        let config = CacheConfig::from_toml("").unwrap();
        assert_eq!(config.default, "array");
        assert!(config.stores.is_empty());
    }

    #[test]
    fn missing_driver_is_invalid() {
        let err = CacheConfig::from_toml("[stores.broken]\nurl = \"x\"\n").unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfig(_)));
    }

    #[test]
    fn default_config_has_array_store() {
        let config = CacheConfig::default();
        assert_eq!(config.default, "array");
        assert_eq!(config.stores["array"].driver, "array");
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.toml");
        std::fs::write(&path, "default = \"file\"\n[stores.file]\ndriver = \"file\"\npath = \"/tmp/c\"\n")
            .unwrap();

        let config = CacheConfig::from_file(&path).unwrap();
        assert_eq!(config.default, "file");
        assert_eq!(config.stores["file"].path.as_deref(), Some("/tmp/c"));
    }
}
