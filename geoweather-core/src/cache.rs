//! Timestamped weather cache over a durable string key-value store.
//!
//! Values are JSON objects of the form `{"timestamp": <epoch-ms>, "data": <snapshot>}`.
//! Reads fail soft and writes are fire-and-forget: the cache never surfaces an
//! error to its caller.

use async_trait::async_trait;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt::{Debug, Write as _},
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::sync::Mutex;

use crate::model::{CacheEntry, WeatherSnapshot};

/// Failure of the underlying key-value substrate.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Durable string-keyed storage holding serialized JSON values.
#[async_trait]
pub trait KvStore: Send + Sync + Debug {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Process-local store. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.lock().await.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One file per key inside a directory. Survives process restarts.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    tmp_counter: AtomicU64,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            tmp_counter: AtomicU64::new(0),
        }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(file_name_for(key))
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path_for(key);
        // Unique across processes sharing the directory and across tasks in this one.
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let pid = std::process::id();
        let tmp = self.dir.join(format!(".{}.{pid}.{n}.tmp", file_name_for(key)));

        tokio::fs::write(&tmp, value)
            .await
            .map_err(|source| StoreError::Io { path: tmp.clone(), source })?;

        if let Err(source) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::Io { path, source });
        }

        Ok(())
    }
}

/// Map a key to a file name. Bytes outside `[A-Za-z0-9._-]` are percent-escaped,
/// so distinct keys never share a file.
fn file_name_for(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 5);
    for b in key.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'-' | b'_' => out.push(b as char),
            _ => {
                let _ = write!(out, "%{b:02X}");
            }
        }
    }
    out.push_str(".json");
    out
}

/// Internal cache fault. Always absorbed by [`CacheStore`].
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("corrupt cache entry: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    timestamp: i64,
    data: WeatherSnapshot,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    store: Arc<dyn KvStore>,
}

impl CacheStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Return the entry stored under `key`, regardless of age.
    /// Unreadable or malformed values are reported as absent.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        match self.try_get(key).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key, error = %e, "ignoring unreadable cache entry");
                None
            }
        }
    }

    /// Store `entry` under `entry.key`, overwriting whatever was there.
    /// Write failures are logged and dropped.
    pub async fn put(&self, entry: &CacheEntry) {
        if let Err(e) = self.try_put(entry).await {
            tracing::warn!(key = %entry.key, error = %e, "failed to write cache entry");
        }
    }

    async fn try_get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };

        let record: StoredRecord =
            serde_json::from_str(&raw).map_err(|e| CacheError::Corrupt(e.to_string()))?;

        let captured_at = DateTime::from_timestamp_millis(record.timestamp).ok_or_else(|| {
            CacheError::Corrupt(format!("timestamp {} out of range", record.timestamp))
        })?;

        Ok(Some(CacheEntry::new(key, captured_at, record.data)))
    }

    async fn try_put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let record = StoredRecord {
            timestamp: entry.captured_at.timestamp_millis(),
            data: entry.payload.clone(),
        };
        let raw = serde_json::to_string(&record).map_err(|e| CacheError::Corrupt(e.to_string()))?;
        self.store.set(&entry.key, &raw).await?;
        Ok(())
    }
}
