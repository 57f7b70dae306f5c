//! Local key-value persistence for the dashboard client.
//!
//! Provides the [`KeyValueStore`] seam and [`KvStore`], an async store backed
//! by an in-memory map and an optional JSON file. Every mutation rewrites the
//! full file. An optional byte quota mimics browser storage limits.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{MacroError, Result};

/// String key-value storage used for day-scoped caches.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
    async fn keys(&self) -> Result<Vec<String>>;
}

/// Async key-value store backed by an optional JSON file.
///
/// Clone is cheap; all clones share the same map.
#[derive(Clone)]
pub struct KvStore {
    entries: Arc<RwLock<BTreeMap<String, String>>>,
    path: Option<PathBuf>,
    quota_bytes: Option<usize>,
}

impl KvStore {
    /// Create a store backed by a JSON file at `path`.
    ///
    /// Call [`load`](Self::load) after construction to restore previously
    /// persisted entries.
    pub fn new(path: PathBuf) -> Self {
        Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
            path: Some(path),
            quota_bytes: None,
        }
    }

    /// Create an in-memory-only store.
    pub fn new_in_memory() -> Self {
        Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
            path: None,
            quota_bytes: None,
        }
    }

    /// Reject writes that would push total key+value size past `bytes`.
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota_bytes = Some(bytes);
        self
    }

    /// Load entries from the backing file.
    ///
    /// No-op if the file does not exist or this is an in-memory store.
    pub async fn load(&self) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }
        let data = tokio::fs::read_to_string(path).await?;
        let loaded: BTreeMap<String, String> = serde_json::from_str(&data)
            .map_err(|e| MacroError::Storage(format!("corrupt store {}: {e}", path.display())))?;
        *self.entries.write().await = loaded;
        Ok(())
    }

    async fn save(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        let data = serde_json::to_string_pretty(entries)
            .map_err(|e| MacroError::Storage(e.to_string()))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, data).await?;
        Ok(())
    }

    fn used_bytes(entries: &BTreeMap<String, String>) -> usize {
        entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

#[async_trait]
impl KeyValueStore for KvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let mut entries = self.entries.write().await;
        if let Some(quota) = self.quota_bytes {
            let existing = entries.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
            let projected = Self::used_bytes(&entries) - existing + key.len() + value.len();
            if projected > quota {
                return Err(MacroError::Storage(format!(
                    "quota exceeded writing {key}: {projected} > {quota} bytes"
                )));
            }
        }
        let previous = entries.insert(key.to_string(), value);
        if let Err(e) = self.save(&entries).await {
            // Memory never runs ahead of the file.
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        if let Some(old) = entries.remove(key) {
            if let Err(e) = self.save(&entries).await {
                entries.insert(key.to_string(), old);
                return Err(e);
            }
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_with_dir() -> (KvStore, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("state").join("store.json");
        (KvStore::new(path), dir)
    }

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = KvStore::new_in_memory();
        store.set("a", "1".into()).await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
        store.remove("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        // Removing a missing key is fine.
        store.remove("a").await.unwrap();
    }

    #[tokio::test]
    async fn test_keys_sorted() {
        let store = KvStore::new_in_memory();
        store.set("insights_v9_2026-03-08", "{}".into()).await.unwrap();
        store.set("insights_v9_2026-03-07", "{}".into()).await.unwrap();
        assert_eq!(
            store.keys().await.unwrap(),
            vec!["insights_v9_2026-03-07", "insights_v9_2026-03-08"]
        );
    }

    #[tokio::test]
    async fn test_persist_and_reload() {
        let (store, dir) = store_with_dir();
        store.set("podcast_cache_v3", r#"{"lines":[]}"#.into()).await.unwrap();

        let reopened = KvStore::new(dir.path().join("state").join("store.json"));
        reopened.load().await.unwrap();
        assert_eq!(
            reopened.get("podcast_cache_v3").await.unwrap().as_deref(),
            Some(r#"{"lines":[]}"#)
        );
    }

    #[tokio::test]
    async fn test_load_nonexistent_file_is_ok() {
        let dir = TempDir::new().unwrap();
        let store = KvStore::new(dir.path().join("missing.json"));
        store.load().await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_corrupt_file_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "not json").unwrap();
        let err = KvStore::new(path).load().await.unwrap_err();
        assert!(matches!(err, MacroError::Storage(_)));
    }

    #[tokio::test]
    async fn test_quota_rejects_large_write() {
        let store = KvStore::new_in_memory().with_quota(16);
        store.set("k", "small".into()).await.unwrap();
        let err = store.set("big", "x".repeat(64)).await.unwrap_err();
        assert!(matches!(err, MacroError::Storage(_)));
        // Overwriting an existing key only counts the difference.
        store.set("k", "smaller!".into()).await.unwrap();
    }

    /// A store whose parent "directory" is a regular file, so every save fails.
    fn unwritable_store(dir: &TempDir) -> KvStore {
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file").unwrap();
        KvStore::new(blocker.join("store.json"))
    }

    #[tokio::test]
    async fn test_failed_save_leaves_memory_unchanged() {
        let dir = TempDir::new().unwrap();
        let store = unwritable_store(&dir);

        let err = store.set("insights_v9_2026-03-07", "{}".into()).await.unwrap_err();
        assert!(matches!(err, MacroError::Io(_)));
        assert!(store.get("insights_v9_2026-03-07").await.unwrap().is_none());
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_save_restores_previous_value() {
        let dir = TempDir::new().unwrap();
        let store = unwritable_store(&dir);
        store.entries.write().await.insert("k".into(), "old".into());

        assert!(store.set("k", "new".into()).await.is_err());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("old"));

        assert!(store.remove("k").await.is_err());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("old"));
    }
}
