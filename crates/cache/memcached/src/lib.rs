//! Memcached cache backend for keylock.
//!
//! [`MemcachedStore`] speaks the Memcached text protocol over a pool of TCP
//! connections managed by `deadpool`. Expiry is enforced server-side with
//! whole-second resolution; `add` is the native atomic command.
//!
//! Locks handed out by the store are [`MemcachedLock`]s. Their release is a
//! read followed by a delete, see the [`lock`] module for what that allows.
//!
//! # Example
//!
//! ```ignore
//! use keylock_cache::Store;
//! use keylock_memcached::{MemcachedConfig, MemcachedStore};
//!
//! let store = MemcachedStore::new(&MemcachedConfig::new("127.0.0.1:11211"))?;
//! store.put("greeting", "hello", Some(Duration::from_secs(60))).await?;
//! ```

mod config;
pub mod lock;
mod pool;
pub mod protocol;
mod store;

pub use config::MemcachedConfig;
pub use lock::MemcachedLock;
pub use store::MemcachedStore;
