//! Filesystem cache backend for keylock.
//!
//! [`FileStore`] writes one file per key under a root directory. It suits a
//! single host where the cache should survive restarts. Its locks are
//! [`FileLock`]s, the generic store-backed lock, and are not safe against
//! concurrent writers.

mod store;

pub use store::{FileLock, FileStore};
