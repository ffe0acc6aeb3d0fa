// crates/core/src/cache.rs
//! File-backed key/value store with TTL freshness.
//!
//! Each key is two sibling files: `<key>` holds the value and
//! `<key>.timestamp` holds the write time in epoch seconds. Writes go data
//! first, timestamp last, so a fresh timestamp never pairs with missing data.
//! There is no locking; concurrent writers re-derive the same external truth
//! and the next refresh corrects a torn write.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::{CollectorError, CollectorResult};

const TIMESTAMP_SUFFIX: &str = ".timestamp";

/// One per invocation, handed to collectors by reference.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

pub fn now_epoch_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    fn timestamp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}{TIMESTAMP_SUFFIX}"))
    }

    /// The cached value if both files exist and the entry is younger than `ttl_secs`.
    ///
    /// Missing, unreadable and unparsable entries all read as a miss.
    pub async fn read(&self, key: &str, ttl_secs: u64) -> Option<String> {
        self.read_at(key, ttl_secs, now_epoch_secs()).await
    }

    async fn read_at(&self, key: &str, ttl_secs: u64, now: i64) -> Option<String> {
        let written_at = match self.written_at(key).await {
            Ok(ts) => ts,
            Err(e) => {
                tracing::debug!(key, error = %e, "cache miss");
                return None;
            }
        };
        let age = now - written_at;
        if age < 0 || age >= ttl_secs as i64 {
            tracing::debug!(key, age, ttl_secs, "cache entry expired");
            return None;
        }
        self.read_raw(key).await
    }

    async fn written_at(&self, key: &str) -> CollectorResult<i64> {
        let path = self.timestamp_path(key);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| CollectorError::io(&path, e))?;
        raw.trim()
            .parse::<i64>()
            .map_err(|_| CollectorError::CacheCorrupt { path })
    }

    /// The data file regardless of age. Used for write-once entries.
    pub async fn read_raw(&self, key: &str) -> Option<String> {
        tokio::fs::read_to_string(self.path(key)).await.ok()
    }

    pub async fn write(&self, key: &str, value: &str) -> CollectorResult<()> {
        self.write_at(key, value, now_epoch_secs()).await
    }

    async fn write_at(&self, key: &str, value: &str, now: i64) -> CollectorResult<()> {
        let data_path = self.write_raw(key, value).await?;
        let ts_path = self.timestamp_path(key);
        tokio::fs::write(&ts_path, now.to_string())
            .await
            .map_err(|e| CollectorError::io(&ts_path, e))?;
        tracing::debug!(path = %data_path.display(), "cache entry written");
        Ok(())
    }

    /// Write the data file only, creating parent directories.
    pub async fn write_raw(&self, key: &str, value: &str) -> CollectorResult<PathBuf> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CollectorError::io(parent, e))?;
        }
        tokio::fs::write(&path, value)
            .await
            .map_err(|e| CollectorError::io(&path, e))?;
        Ok(path)
    }

    /// Deserialize a JSON document stored under `key`; corrupt documents are misses.
    pub async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.read_raw(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(key, error = %e, "corrupt JSON cache entry");
                None
            }
        }
    }

    pub async fn write_json<T: Serialize>(&self, key: &str, value: &T) -> CollectorResult<()> {
        let path = self.path(key);
        let body = serde_json::to_string(value).map_err(|e| {
            CollectorError::io(&path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        self.write_raw(key, &body).await.map(|_| ())
    }
}
