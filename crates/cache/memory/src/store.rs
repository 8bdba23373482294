use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use keylock_cache::error::StoreError;
use keylock_cache::lock::{Lock, LockDescriptor};
use keylock_cache::store::{Store, TaggableStore, effective_ttl};

use crate::lock::{LockTable, MemoryLock};

/// A single entry in the in-memory store.
#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
    tags: BTreeSet<String>,
}

impl Entry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: expiry_from_ttl(ttl),
            tags: BTreeSet::new(),
        }
    }

    /// Returns `true` if this entry has passed its TTL deadline.
    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Compute the expiry instant from an optional TTL duration. A TTL too far
/// out to represent never expires.
fn expiry_from_ttl(ttl: Option<Duration>) -> Option<Instant> {
    effective_ttl(ttl).and_then(|d| Instant::now().checked_add(d))
}

/// In-process [`Store`] backed by a [`DashMap`].
///
/// Entries are lazily evicted on read when their TTL has elapsed. Cloning is
/// cheap and clones share the same entries and lock table.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<DashMap<String, Entry>>,
    locks: LockTable,
}

impl MemoryStore {
    /// Create a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of physically present entries, expired ones included.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn evict_expired(&self, key: &str) {
        self.data.remove_if(key, |_, entry| entry.is_expired());
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        // Lazy TTL eviction: check and remove if expired.
        if let Some(entry) = self.data.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.evict_expired(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }

        Ok(None)
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool, StoreError> {
        self.data
            .insert(key.to_owned(), Entry::new(value.to_owned(), ttl));
        Ok(true)
    }

    async fn add(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool, StoreError> {
        self.evict_expired(key);

        // Use `entry` API for atomicity: only insert if vacant.
        let was_inserted = match self.data.entry(key.to_owned()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Entry::new(value.to_owned(), ttl));
                true
            }
        };

        Ok(was_inserted)
    }

    fn supports_atomic_add(&self) -> bool {
        true
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        // Remove any expired entry first so the counter starts fresh.
        self.evict_expired(key);

        match self.data.entry(key.to_owned()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                let current: i64 =
                    entry
                        .value
                        .parse()
                        .map_err(|e: std::num::ParseIntError| {
                            StoreError::Serialization(format!(
                                "value of {key} is not an integer: {e}"
                            ))
                        })?;
                let new_value = current.checked_add(delta).ok_or_else(|| {
                    StoreError::Serialization(format!("counter {key} would overflow"))
                })?;
                entry.value = new_value.to_string();
                Ok(new_value)
            }
            // A missing counter is created at `delta` and never expires.
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Entry::new(delta.to_string(), None));
                Ok(delta)
            }
        }
    }

    async fn forget(&self, key: &str) -> Result<bool, StoreError> {
        // Remove, but treat expired entries as "not found".
        match self.data.remove(key) {
            Some((_, entry)) => Ok(!entry.is_expired()),
            None => Ok(false),
        }
    }

    async fn flush(&self) -> Result<bool, StoreError> {
        self.data.clear();
        Ok(true)
    }

    fn lock(&self, name: &str, seconds: u64, owner: Option<String>) -> Box<dyn Lock> {
        Box::new(MemoryLock::new(
            Arc::clone(&self.locks),
            LockDescriptor::new(name, seconds, owner),
        ))
    }
}

#[async_trait]
impl TaggableStore for MemoryStore {
    async fn put_tagged(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
        tags: &[&str],
    ) -> Result<bool, StoreError> {
        let mut entry = Entry::new(value.to_owned(), ttl);
        entry.tags = tags.iter().map(|tag| (*tag).to_owned()).collect();
        self.data.insert(key.to_owned(), entry);
        Ok(true)
    }

    async fn tags_of(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .data
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.tags.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Tag-filtered flushing is not supported by the in-process store; this
    /// is a no-op that reports `false`.
    async fn flush_tagged(&self, tags: &[&str]) -> Result<bool, StoreError> {
        tracing::debug!(?tags, "tag-filtered flush is not supported by the memory store");
        Ok(false)
    }
}
