//! Named response stores, optionally persisted to disk.
//!
//! Mirrors a browser cache storage: a set of named stores, each mapping an
//! absolute URL to a response. When backed by a directory, every mutation
//! rewrites `stores.json` so separate processes see the same stores.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{CacheError, CacheResult};

use super::types::Response;

/// File name of the persisted manifest inside the cache directory.
const STORAGE_FILE: &str = "stores.json";

type Store = BTreeMap<String, Response>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    stores: BTreeMap<String, Store>,
    /// Version that last activated; absent in manifests written before it existed
    #[serde(default)]
    active: Option<u32>,
}

struct StorageInner {
    path: Option<PathBuf>,
    state: Mutex<Snapshot>,
}

/// Process-wide handle to every cache store.
#[derive(Clone)]
pub struct CacheStorage {
    inner: Arc<StorageInner>,
}

impl CacheStorage {
    /// Storage that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::with_snapshot(None, Snapshot::default())
    }

    /// Load (or start) the storage persisted under `dir`.
    pub async fn open(dir: &Path) -> CacheResult<Self> {
        let path = dir.join(STORAGE_FILE);
        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!("Opened cache storage at {:?}", path);
        Ok(Self::with_snapshot(Some(path), snapshot))
    }

    fn with_snapshot(path: Option<PathBuf>, snapshot: Snapshot) -> Self {
        Self {
            inner: Arc::new(StorageInner {
                path,
                state: Mutex::new(snapshot),
            }),
        }
    }

    fn lock(&self) -> CacheResult<MutexGuard<'_, Snapshot>> {
        self.inner
            .state
            .lock()
            .map_err(|_| CacheError::Io(std::io::Error::other("cache storage lock poisoned")))
    }

    /// Names of every existing store, sorted.
    pub fn keys(&self) -> CacheResult<Vec<String>> {
        Ok(self.lock()?.stores.keys().cloned().collect())
    }

    pub fn has(&self, name: &str) -> CacheResult<bool> {
        Ok(self.lock()?.stores.contains_key(name))
    }

    /// URLs stored in one store.
    pub fn urls(&self, name: &str) -> CacheResult<Vec<String>> {
        Ok(self
            .lock()?
            .stores
            .get(name)
            .map(|store| store.keys().cloned().collect())
            .unwrap_or_default())
    }

    /// Find a response for `url` in any store.
    pub fn lookup(&self, url: &str) -> CacheResult<Option<Response>> {
        Ok(self
            .lock()?
            .stores
            .values()
            .find_map(|store| store.get(url).cloned()))
    }

    /// Find a response for `url` in one store.
    pub fn lookup_in(&self, name: &str, url: &str) -> CacheResult<Option<Response>> {
        Ok(self
            .lock()?
            .stores
            .get(name)
            .and_then(|store| store.get(url).cloned()))
    }

    /// The version recorded by the last activation, if any.
    pub fn active_version(&self) -> CacheResult<Option<u32>> {
        Ok(self.lock()?.active)
    }

    /// Record which version routes requests.
    pub async fn set_active_version(&self, version: Option<u32>) -> CacheResult<()> {
        self.lock()?.active = version;
        self.persist().await
    }

    /// Store one response, creating the store if needed.
    pub async fn put(&self, name: &str, url: &str, response: Response) -> CacheResult<()> {
        {
            let mut state = self.lock()?;
            state
                .stores
                .entry(name.to_string())
                .or_default()
                .insert(url.to_string(), response);
        }
        self.persist().await
    }

    /// Store a batch of responses as one unit.
    ///
    /// The batch is merged into the store in one step, so readers observe
    /// either none of the entries or all of them.
    pub async fn put_all(&self, name: &str, entries: Vec<(String, Response)>) -> CacheResult<()> {
        {
            let mut state = self.lock()?;
            let store = state.stores.entry(name.to_string()).or_default();
            store.extend(entries);
        }
        self.persist().await
    }

    /// Delete one store. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> CacheResult<bool> {
        let existed = self.lock()?.stores.remove(name).is_some();
        if existed {
            self.persist().await?;
        }
        Ok(existed)
    }

    /// Delete every store and the active marker. Returns how many stores were removed.
    pub async fn clear(&self) -> CacheResult<usize> {
        let removed = {
            let mut state = self.lock()?;
            let n = state.stores.len();
            state.stores.clear();
            state.active = None;
            n
        };
        self.persist().await?;
        Ok(removed)
    }

    /// Write the current snapshot to disk (no-op for in-memory storage).
    async fn persist(&self) -> CacheResult<()> {
        let Some(path) = &self.inner.path else {
            return Ok(());
        };
        let json = serde_json::to_vec(&*self.lock()?)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write-then-rename so a crash never leaves a torn manifest
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_lookup_across_stores() {
        let storage = CacheStorage::in_memory();
        storage
            .put("a", "http://x.test/1", Response::new(200, "one"))
            .await
            .unwrap();
        storage
            .put("b", "http://x.test/2", Response::new(200, "two"))
            .await
            .unwrap();

        assert_eq!(storage.keys().unwrap(), vec!["a", "b"]);
        assert_eq!(storage.lookup("http://x.test/2").unwrap().unwrap().body, b"two");
        assert!(storage.lookup_in("a", "http://x.test/2").unwrap().is_none());
        assert!(storage.lookup("http://x.test/3").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let storage = CacheStorage::in_memory();
        storage.put("a", "u", Response::new(200, "")).await.unwrap();
        storage.put("b", "u", Response::new(200, "")).await.unwrap();

        assert!(storage.delete("a").await.unwrap());
        assert!(!storage.delete("a").await.unwrap());
        assert_eq!(storage.clear().await.unwrap(), 1);
        assert!(storage.keys().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persisted_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = CacheStorage::open(dir.path()).await.unwrap();
            storage
                .put_all(
                    "metavision-cache-v1",
                    vec![
                        ("http://x.test/".to_string(), Response::new(200, "<html>")),
                        ("http://x.test/a.png".to_string(), Response::new(200, vec![0, 1, 2])),
                    ],
                )
                .await
                .unwrap();
        }

        let reopened = CacheStorage::open(dir.path()).await.unwrap();
        assert_eq!(reopened.urls("metavision-cache-v1").unwrap().len(), 2);
        assert_eq!(
            reopened.lookup("http://x.test/a.png").unwrap().unwrap().body,
            vec![0, 1, 2]
        );
    }

    #[tokio::test]
    async fn test_corrupt_manifest_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(STORAGE_FILE), "not json").unwrap();
        assert!(matches!(
            CacheStorage::open(dir.path()).await,
            Err(CacheError::Json(_))
        ));
    }

    #[tokio::test]
    async fn test_active_marker_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = CacheStorage::open(dir.path()).await.unwrap();
            assert_eq!(storage.active_version().unwrap(), None);
            storage.set_active_version(Some(3)).await.unwrap();
        }

        let reopened = CacheStorage::open(dir.path()).await.unwrap();
        assert_eq!(reopened.active_version().unwrap(), Some(3));
        reopened.clear().await.unwrap();
        assert_eq!(reopened.active_version().unwrap(), None);
    }

    #[tokio::test]
    async fn test_manifest_without_active_marker_loads() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(STORAGE_FILE), br#"{"stores":{"a":{}}}"#).unwrap();

        let storage = CacheStorage::open(dir.path()).await.unwrap();
        assert_eq!(storage.keys().unwrap(), vec!["a"]);
        assert_eq!(storage.active_version().unwrap(), None);
    }
}
