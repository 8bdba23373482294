use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use keylock_cache::cache_lock::CacheLock;
use keylock_cache::error::StoreError;
use keylock_cache::lock::{Lock, LockDescriptor};
use keylock_cache::owner::generate_owner;
use keylock_cache::store::{Store, effective_ttl};

/// Width of the expiry header at the start of every entry file.
const HEADER_LEN: usize = 13;

/// Expiry header value for entries that never expire.
const FOREVER: i64 = 9_999_999_999_999;

/// Lock handed out by [`FileStore`].
///
/// The file store has no atomic create-if-absent, so acquisition is a read
/// followed by a write. Only use it where a single process writes the
/// directory.
pub type FileLock = CacheLock;

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn expires_at(ttl: Option<Duration>) -> i64 {
    match effective_ttl(ttl) {
        Some(ttl) => {
            let millis = i64::try_from(ttl.as_millis()).unwrap_or(FOREVER).max(1);
            now_millis().saturating_add(millis).min(FOREVER)
        }
        None => FOREVER,
    }
}

fn encode(expires_at: i64, value: &str) -> String {
    format!("{expires_at:0width$}{value}", width = HEADER_LEN)
}

/// A decoded entry file.
struct Entry {
    expires_at: i64,
    value: String,
}

fn decode(raw: &str) -> Option<Entry> {
    let header = raw.get(..HEADER_LEN)?;
    let expires_at = header.parse().ok()?;
    Some(Entry {
        expires_at,
        value: raw[HEADER_LEN..].to_owned(),
    })
}

/// Filesystem implementation of [`Store`].
///
/// Every key is a file under the root directory at
/// `<root>/<aa>/<bb>/<sha256(key)>`, where `aa` and `bb` are the first two
/// byte pairs of the hex digest. A file holds a 13-digit unix-millisecond
/// expiry followed by the raw value. Expired files are deleted when read.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root`. The directory is created on first
    /// write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        tracing::debug!(root = %root.display(), "file store created");
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the file holding `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let digest = hex::encode(hasher.finalize());

        self.root
            .join(&digest[0..2])
            .join(&digest[2..4])
            .join(&digest)
    }

    /// Read a live entry, deleting it if it has expired or cannot be decoded.
    async fn read(&self, key: &str) -> Result<Option<Entry>, StoreError> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let decoded = String::from_utf8(bytes).ok().and_then(|raw| decode(&raw));
        match decoded {
            Some(entry) if entry.expires_at > now_millis() => Ok(Some(entry)),
            Some(_) => {
                remove_file(&path).await?;
                Ok(None)
            }
            None => {
                tracing::debug!(key = %key, path = %path.display(), "discarding unreadable cache file");
                remove_file(&path).await?;
                Ok(None)
            }
        }
    }

    /// Write an entry through a temporary sibling file renamed over the
    /// target, so readers never observe a partially written entry.
    async fn write(&self, key: &str, expires_at: i64, value: &str) -> Result<bool, StoreError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let staging = path.with_extension(format!("{}.tmp", generate_owner()));
        let written = match tokio::fs::write(&staging, encode(expires_at, value)).await {
            Ok(()) => tokio::fs::rename(&staging, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = remove_file(&staging).await;
            return Err(e.into());
        }
        Ok(true)
    }
}

/// Remove a file. Returns `false` if it did not exist.
async fn remove_file(path: &Path) -> Result<bool, StoreError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl Store for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read(key).await?.map(|entry| entry.value))
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool, StoreError> {
        self.write(key, expires_at(ttl), value).await
    }

    /// Missing keys start from zero and never expire. Existing keys keep
    /// their remaining expiry.
    async fn increment(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let (current, expires_at) = match self.read(key).await? {
            Some(entry) => {
                let current: i64 = entry.value.trim().parse().map_err(|_| {
                    StoreError::Serialization(format!("value at {key} is not an integer"))
                })?;
                (current, entry.expires_at)
            }
            None => (0, FOREVER),
        };

        let updated = current
            .checked_add(delta)
            .ok_or_else(|| StoreError::Serialization(format!("counter {key} overflowed")))?;
        self.write(key, expires_at, &updated.to_string()).await?;
        Ok(updated)
    }

    async fn forget(&self, key: &str) -> Result<bool, StoreError> {
        remove_file(&self.path_for(key)).await
    }

    /// Remove every entry directory under the root. Returns `false` when the
    /// root does not exist.
    async fn flush(&self) -> Result<bool, StoreError> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(entry.path()).await?;
            }
        }
        Ok(true)
    }

    fn lock(&self, name: &str, seconds: u64, owner: Option<String>) -> Box<dyn Lock> {
        Box::new(FileLock::new(
            Arc::new(self.clone()),
            LockDescriptor::new(name, seconds, owner),
        ))
    }
}
