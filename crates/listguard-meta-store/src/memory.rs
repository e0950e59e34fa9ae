//! In-process metastore backend.
//!
//! Records live in a `BTreeMap` keyed by [`StorePath::key`], so the direct
//! children of a location form one contiguous key range.

use crate::error::{MetaStoreError, MetaStoreResult};
use crate::metastore::{Metastore, is_direct_child};
use async_trait::async_trait;
use listguard_common::{FileInfo, StorePath};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

/// Metastore held entirely in memory
#[derive(Debug)]
pub struct InMemoryMetastore {
    records: RwLock<BTreeMap<String, FileInfo>>,
    delete_markers: bool,
    timeout: RwLock<Duration>,
    closed: AtomicBool,
}

impl InMemoryMetastore {
    /// Create an empty store
    #[must_use]
    pub fn new(delete_markers: bool, timeout: Duration) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            delete_markers,
            timeout: RwLock::new(timeout),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of records, tombstones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Record stored for `path`, if any
    #[must_use]
    pub fn get(&self, path: &StorePath) -> Option<FileInfo> {
        self.records.read().get(&path.key()).cloned()
    }

    fn ensure_open(&self) -> MetaStoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MetaStoreError::Closed);
        }
        Ok(())
    }

    fn remove_locked(&self, records: &mut BTreeMap<String, FileInfo>, path: &StorePath) {
        let key = path.key();
        if self.delete_markers {
            let tombstone = records.remove(&key).map_or_else(
                || FileInfo::new(path.clone(), false).into_tombstone(),
                FileInfo::into_tombstone,
            );
            records.insert(key, tombstone);
        } else {
            records.remove(&key);
        }
    }
}

impl Default for InMemoryMetastore {
    fn default() -> Self {
        Self::new(false, Duration::from_secs(5))
    }
}

#[async_trait]
impl Metastore for InMemoryMetastore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn initialize(&self, location: &str) -> MetaStoreResult<()> {
        debug!("In-memory metastore ready (location '{}' ignored)", location);
        self.closed.store(false, Ordering::Release);
        Ok(())
    }

    async fn add(&self, path: &StorePath, is_directory: bool) -> MetaStoreResult<()> {
        self.ensure_open()?;
        let info = FileInfo::new(path.clone(), is_directory);
        self.records.write().insert(info.key(), info);
        Ok(())
    }

    async fn add_all(&self, records: &[FileInfo]) -> MetaStoreResult<()> {
        self.ensure_open()?;
        let mut map = self.records.write();
        for info in records {
            map.insert(info.key(), info.clone());
        }
        Ok(())
    }

    async fn list(&self, paths: &[StorePath]) -> MetaStoreResult<Vec<FileInfo>> {
        self.ensure_open()?;
        let map = self.records.read();
        let mut found = BTreeMap::new();
        for path in paths {
            let prefix = path.child_prefix();
            for (key, info) in map.range(prefix.clone()..) {
                if !key.starts_with(&prefix) {
                    break;
                }
                if is_direct_child(key, &prefix) {
                    found.insert(key.clone(), info.clone());
                }
            }
        }
        Ok(found.into_values().collect())
    }

    async fn delete(&self, path: &StorePath) -> MetaStoreResult<()> {
        self.ensure_open()?;
        let mut map = self.records.write();
        self.remove_locked(&mut map, path);
        Ok(())
    }

    async fn delete_all(&self, paths: &[StorePath]) -> MetaStoreResult<()> {
        self.ensure_open()?;
        let mut map = self.records.write();
        for path in paths {
            self.remove_locked(&mut map, path);
        }
        Ok(())
    }

    async fn purge_tombstones(&self, older_than_millis: i64) -> MetaStoreResult<usize> {
        self.ensure_open()?;
        let mut map = self.records.write();
        let before = map.len();
        map.retain(|_, info| !(info.deleted && info.updated_at < older_than_millis));
        Ok(before - map.len())
    }

    async fn close(&self) -> MetaStoreResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn timeout(&self) -> Duration {
        *self.timeout.read()
    }

    fn set_timeout(&self, timeout: Duration) {
        *self.timeout.write() = timeout;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> StorePath {
        StorePath::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_add_is_upsert() {
        let store = InMemoryMetastore::default();
        store.add(&p("s3://b/dir/a"), false).await.unwrap();
        store.add(&p("s3://b/dir//a/"), false).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_list_direct_children_only() {
        let store = InMemoryMetastore::default();
        store.add(&p("s3://b/dir"), true).await.unwrap();
        store.add(&p("s3://b/dir/a"), false).await.unwrap();
        store.add(&p("s3://b/dir/sub"), true).await.unwrap();
        store.add(&p("s3://b/dir/sub/deep"), false).await.unwrap();
        store.add(&p("s3://b/dir2/x"), false).await.unwrap();

        let mut keys: Vec<String> = store
            .list(&[p("s3://b/dir")])
            .await
            .unwrap()
            .iter()
            .map(FileInfo::key)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["//b/dir/a", "//b/dir/sub"]);

        let root = store.list(&[p("s3://b/")]).await.unwrap();
        assert_eq!(root.len(), 1);
        assert_eq!(root[0].key(), "//b/dir");
    }

    #[tokio::test]
    async fn test_delete_without_markers() {
        let store = InMemoryMetastore::default();
        store.add(&p("s3://b/dir/a"), false).await.unwrap();
        store.delete(&p("s3://b/dir/a")).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete_with_markers() {
        let store = InMemoryMetastore::new(true, Duration::from_secs(1));
        store.add(&p("s3://b/dir/a"), false).await.unwrap();
        store
            .delete_all(&[p("s3://b/dir/a"), p("s3://b/dir/never-seen")])
            .await
            .unwrap();

        let listed = store.list(&[p("s3://b/dir")]).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|info| info.deleted));

        // Re-adding clears the tombstone
        store.add(&p("s3://b/dir/a"), false).await.unwrap();
        assert!(!store.get(&p("s3://b/dir/a")).unwrap().deleted);
    }

    #[tokio::test]
    async fn test_purge_tombstones() {
        let store = InMemoryMetastore::new(true, Duration::from_secs(1));
        store.add(&p("s3://b/a"), false).await.unwrap();
        store.add(&p("s3://b/c"), false).await.unwrap();
        store.delete(&p("s3://b/a")).await.unwrap();

        assert_eq!(store.purge_tombstones(0).await.unwrap(), 0);
        assert_eq!(store.purge_tombstones(i64::MAX).await.unwrap(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_closed_store_rejects_calls() {
        let store = InMemoryMetastore::default();
        store.close().await.unwrap();
        let err = store.add(&p("s3://b/a"), false).await.unwrap_err();
        assert!(matches!(err, MetaStoreError::Closed));

        store.initialize("ignored").await.unwrap();
        store.add(&p("s3://b/a"), false).await.unwrap();
    }

    #[test]
    fn test_timeout_accessors() {
        let store = InMemoryMetastore::default();
        store.set_timeout(Duration::from_millis(250));
        assert_eq!(store.timeout(), Duration::from_millis(250));
    }
}
