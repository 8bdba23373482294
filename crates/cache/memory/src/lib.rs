//! In-process cache backend for keylock.
//!
//! [`MemoryStore`] keeps entries in a [`dashmap::DashMap`] and evicts expired
//! entries lazily on access. Its locks ([`MemoryLock`]) live in a separate
//! table of the same store.
//!
//! Everything here is local to one OS process. Two processes each holding a
//! `MemoryStore` do not see each other's entries or locks; use the Redis or
//! Memcached backends for cross-process mutual exclusion.

mod lock;
mod store;

pub use lock::MemoryLock;
pub use store::MemoryStore;
