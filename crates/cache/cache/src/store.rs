use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::lock::Lock;

/// Normalize a caller TTL: `None` and zero both mean "never expires".
pub fn effective_ttl(ttl: Option<Duration>) -> Option<Duration> {
    ttl.filter(|d| !d.is_zero())
}

/// Key/value cache store with optional per-entry expiry.
///
/// A key written with an expiry is logically absent once that expiry passes,
/// whether the backend evicts it eagerly or lazily. Every store is also a
/// factory for [`Lock`] instances that talk to the same backing medium.
#[async_trait]
pub trait Store: Send + Sync {
    /// Get the value for a key. Returns `None` if not found or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Get several keys at once. The result preserves the order of `keys`
    /// and maps missing keys to `None`.
    async fn many(&self, keys: &[&str]) -> Result<Vec<(String, Option<String>)>, StoreError> {
        let mut found = Vec::with_capacity(keys.len());
        for key in keys {
            found.push(((*key).to_owned(), self.get(key).await?));
        }
        Ok(found)
    }

    /// Set a value, overwriting any previous one. See [`effective_ttl`].
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool, StoreError>;

    /// Set several values sharing one TTL.
    async fn put_many(
        &self,
        entries: &[(&str, &str)],
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let mut all_stored = true;
        for (key, value) in entries {
            all_stored &= self.put(key, value, ttl).await?;
        }
        Ok(all_stored)
    }

    /// Set a value that never expires.
    async fn forever(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        self.put(key, value, None).await
    }

    /// Store a value only if the key is absent or expired.
    ///
    /// The provided implementation reads then writes and is **not** atomic.
    /// Backends with a native create-if-absent primitive override it and
    /// report so through [`Store::supports_atomic_add`].
    async fn add(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool, StoreError> {
        if self.get(key).await?.is_some() {
            return Ok(false);
        }
        self.put(key, value, ttl).await
    }

    /// Whether [`Store::add`] is a single atomic backend operation.
    fn supports_atomic_add(&self) -> bool {
        false
    }

    /// Adjust a numeric value by `delta` and return the new value.
    ///
    /// Behavior on a missing key is backend specific: the in-process and
    /// Redis backends start from zero, Memcached reports
    /// [`StoreError::NotFound`].
    async fn increment(&self, key: &str, delta: i64) -> Result<i64, StoreError>;

    async fn decrement(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.increment(key, -delta).await
    }

    /// Remove a key.
    async fn forget(&self, key: &str) -> Result<bool, StoreError>;

    /// Remove every entry in the store.
    async fn flush(&self) -> Result<bool, StoreError>;

    /// The namespace prefix this store applies to prefixed keys.
    fn prefix(&self) -> &str {
        ""
    }

    /// Build a lock bound to this store. No backend call is made.
    ///
    /// `seconds == 0` means the lock record never expires. A random owner
    /// token is generated when `owner` is `None`.
    fn lock(&self, name: &str, seconds: u64, owner: Option<String>) -> Box<dyn Lock>;

    /// Rebuild a lock object for a record assumed to be held by `owner`.
    ///
    /// Nothing is acquired or validated; the returned lock can release a
    /// record that `owner` acquired earlier, possibly in another process.
    fn restore_lock(&self, name: &str, owner: &str) -> Box<dyn Lock> {
        self.lock(name, 0, Some(owner.to_owned()))
    }
}

/// A [`Store`] whose entries can carry tags.
#[async_trait]
pub trait TaggableStore: Store {
    async fn put_tagged(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
        tags: &[&str],
    ) -> Result<bool, StoreError>;

    async fn forever_tagged(
        &self,
        key: &str,
        value: &str,
        tags: &[&str],
    ) -> Result<bool, StoreError> {
        self.put_tagged(key, value, None, tags).await
    }

    /// Tags recorded for a live key, sorted. Empty if the key is absent.
    async fn tags_of(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Remove entries carrying any of `tags`.
    async fn flush_tagged(&self, tags: &[&str]) -> Result<bool, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ttl_means_forever() {
        assert_eq!(effective_ttl(Some(Duration::ZERO)), None);
        assert_eq!(effective_ttl(None), None);
        assert_eq!(
            effective_ttl(Some(Duration::from_millis(1))),
            Some(Duration::from_millis(1))
        );
    }

    // Verify object safety of the store traits.
    fn _assert_dyn_store(_: &dyn Store) {}
    fn _assert_dyn_taggable_store(_: &dyn TaggableStore) {}
}
