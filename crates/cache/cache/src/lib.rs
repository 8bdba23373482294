//! Cache store and lock abstractions for keylock.
//!
//! A [`Store`] is a key/value cache with optional expiry. Every store is also
//! a factory for [`Lock`] instances bound to its backing medium, so a lock
//! acquired through a Redis store is a Redis lock, one acquired through a
//! Memcached store is a Memcached lock, and so on.
//!
//! Backends live in their own crates (`keylock-memory`, `keylock-redis`,
//! `keylock-memcached`, `keylock-file`). This crate also ships
//! [`CacheLock`], a lock that works on top of any [`Store`], and a
//! conformance suite in [`testing`] that every backend runs.

pub mod cache_lock;
pub mod error;
pub mod key;
pub mod lock;
pub mod owner;
pub mod store;
pub mod testing;

pub use cache_lock::CacheLock;
pub use error::StoreError;
pub use key::{format_key, format_key_with_prefix};
pub use lock::{DEFAULT_BLOCK_INTERVAL, Lock, LockDescriptor, LockExt};
pub use owner::generate_owner;
pub use store::{Store, TaggableStore, effective_ttl};
