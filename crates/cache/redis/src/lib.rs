//! Redis cache backend for keylock.
//!
//! This crate provides [`RedisStore`], a [`Store`] over a `deadpool-redis`
//! connection pool, and the [`RedisLock`] it hands out.
//!
//! # Features
//!
//! - **Cache storage**: string values with server-side millisecond expiry,
//!   `MGET` batch reads and `MULTI`/`EXEC` batch writes.
//! - **Atomic add**: create-if-absent via a Lua script.
//! - **Locking**: `SET NX EX` / `SETNX` acquisition and Lua-scripted,
//!   owner-checked release. See the [`lock`] module.
//!
//! # Example
//!
//! ```ignore
//! use keylock_cache::Store;
//! use keylock_redis::{RedisConfig, RedisStore};
//!
//! let store = RedisStore::new(&RedisConfig::new("redis://localhost:6379"))?;
//! let lock = store.lock("reports:nightly", 30, None);
//! if lock.acquire().await? {
//!     // Critical section...
//!     lock.release().await?;
//! }
//! ```
//!
//! [`Store`]: keylock_cache::Store

mod config;
mod error;
pub mod lock;
mod scripts;
mod store;

pub use config::RedisConfig;
pub use lock::RedisLock;
pub use store::RedisStore;
