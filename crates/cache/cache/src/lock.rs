use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::time::Instant;

use crate::error::StoreError;
use crate::owner::generate_owner;

/// Pause between acquisition attempts in [`Lock::block`].
pub const DEFAULT_BLOCK_INTERVAL: Duration = Duration::from_millis(250);

/// The identity of a lock: what it protects, for how long, and on whose
/// behalf.
///
/// A descriptor is plain data. Creating one does not touch any backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockDescriptor {
    /// Resource identifier the lock protects.
    pub name: String,
    /// Lock record TTL in seconds. `0` holds until explicitly released.
    pub seconds: u64,
    /// Token identifying the holder.
    pub owner: String,
}

impl LockDescriptor {
    /// Create a descriptor, generating a random owner token when none is
    /// supplied.
    pub fn new(name: impl Into<String>, seconds: u64, owner: Option<String>) -> Self {
        Self {
            name: name.into(),
            seconds,
            owner: owner.unwrap_or_else(generate_owner),
        }
    }

    /// The record TTL, or `None` when the lock never expires.
    pub fn ttl(&self) -> Option<Duration> {
        (self.seconds > 0).then(|| Duration::from_secs(self.seconds))
    }
}

/// A named mutual-exclusion token backed by a cache store.
///
/// Losing a race and failing an ownership check are reported as `Ok(false)`.
/// Only backend failures surface as errors.
#[async_trait]
pub trait Lock: Send + Sync {
    /// The immutable name, TTL and owner of this lock.
    fn descriptor(&self) -> &LockDescriptor;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    fn seconds(&self) -> u64 {
        self.descriptor().seconds
    }

    fn owner(&self) -> &str {
        &self.descriptor().owner
    }

    /// Try once to create the lock record. Returns `true` iff this call won.
    async fn acquire(&self) -> Result<bool, StoreError>;

    /// Delete the lock record if it is still owned by [`Lock::owner`].
    async fn release(&self) -> Result<bool, StoreError>;

    /// Delete the lock record regardless of who owns it.
    async fn force_release(&self) -> Result<(), StoreError>;

    /// The owner token currently stored for this lock name, if any.
    async fn current_owner(&self) -> Result<Option<String>, StoreError>;

    async fn is_owned_by_current_process(&self) -> Result<bool, StoreError> {
        self.is_owned_by(self.owner()).await
    }

    async fn is_owned_by(&self, owner: &str) -> Result<bool, StoreError> {
        Ok(self.current_owner().await?.as_deref() == Some(owner))
    }

    /// Poll [`Lock::acquire`] until it succeeds or `timeout` elapses.
    ///
    /// On success the lock stays held and the caller must release it.
    async fn block(&self, timeout: Duration) -> Result<bool, StoreError> {
        self.block_every(timeout, DEFAULT_BLOCK_INTERVAL).await
    }

    /// Like [`Lock::block`] with a custom pause between attempts.
    ///
    /// Waiters are not queued; whichever attempt lands first after a
    /// release or expiry wins. A timeout too large to represent waits
    /// without a deadline.
    async fn block_every(&self, timeout: Duration, interval: Duration) -> Result<bool, StoreError> {
        let deadline = Instant::now().checked_add(timeout);

        loop {
            if self.acquire().await? {
                return Ok(true);
            }

            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    interval.min(deadline - now)
                }
                None => interval,
            };

            tracing::trace!(lock = %self.name(), "lock busy, retrying");
            tokio::time::sleep(pause).await;
        }
    }
}

/// Callback helpers available on every [`Lock`], including `dyn Lock`.
pub trait LockExt: Lock {
    /// Block for up to `timeout`, run `callback` while holding the lock, then
    /// release it.
    ///
    /// Fails with [`StoreError::LockTimeout`] if the lock is not acquired in
    /// time. The lock is released even if the callback panics; the panic is
    /// resumed afterwards.
    fn block_with<F, Fut, T>(
        &self,
        timeout: Duration,
        callback: F,
    ) -> impl Future<Output = Result<T, StoreError>> + Send
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = T> + Send,
        T: Send,
    {
        async move {
            if !self.block(timeout).await? {
                return Err(StoreError::LockTimeout(timeout));
            }
            run_then_release(self, callback).await
        }
    }

    /// Try once to acquire; if that wins, run `callback` and release.
    ///
    /// Returns `None` without running the callback when the lock is busy.
    fn get_with<F, Fut, T>(
        &self,
        callback: F,
    ) -> impl Future<Output = Result<Option<T>, StoreError>> + Send
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = T> + Send,
        T: Send,
    {
        async move {
            if !self.acquire().await? {
                return Ok(None);
            }
            run_then_release(self, callback).await.map(Some)
        }
    }
}

impl<L: Lock + ?Sized> LockExt for L {}

async fn run_then_release<L, F, Fut, T>(lock: &L, callback: F) -> Result<T, StoreError>
where
    L: Lock + ?Sized,
    F: FnOnce() -> Fut + Send,
    Fut: Future<Output = T> + Send,
{
    let outcome = AssertUnwindSafe(async move { callback().await })
        .catch_unwind()
        .await;
    let released = lock.release().await;

    match outcome {
        Ok(value) => {
            released?;
            Ok(value)
        }
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
