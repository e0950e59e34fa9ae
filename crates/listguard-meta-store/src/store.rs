//! Persistent metastore backed by redb.
//!
//! One table, `files`, maps [`StorePath::key`] to a bincode-encoded
//! [`FileInfo`]. Redb transactions are synchronous, so every call runs on the
//! blocking pool and is bounded by the store's per-call timeout. A call that
//! times out is reported as failed even if its transaction later commits.

use crate::error::{MetaStoreError, MetaStoreResult};
use crate::metastore::{Metastore, is_direct_child, with_timeout};
use crate::tables;
use async_trait::async_trait;
use listguard_common::{FileInfo, StorePath};
use parking_lot::RwLock;
use redb::{Database, ReadableTable};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Metastore persisted in a redb database file
pub struct RedbMetastore {
    db: RwLock<Option<Arc<Database>>>,
    delete_markers: bool,
    timeout: RwLock<Duration>,
}

impl RedbMetastore {
    /// Create an unopened store; call [`Metastore::initialize`] before use
    #[must_use]
    pub fn new(delete_markers: bool, timeout: Duration) -> Self {
        Self {
            db: RwLock::new(None),
            delete_markers,
            timeout: RwLock::new(timeout),
        }
    }

    /// Open (or create) the database at `path` synchronously
    pub fn open(
        path: impl AsRef<Path>,
        delete_markers: bool,
        timeout: Duration,
    ) -> MetaStoreResult<Self> {
        let store = Self::new(delete_markers, timeout);
        let db = open_database(path.as_ref())?;
        *store.db.write() = Some(Arc::new(db));
        Ok(store)
    }

    fn database(&self) -> MetaStoreResult<Arc<Database>> {
        self.db.read().clone().ok_or(MetaStoreError::NotInitialized)
    }

    async fn run<T, F>(&self, operation: &'static str, f: F) -> MetaStoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> MetaStoreResult<T> + Send + 'static,
    {
        let db = self.database()?;
        with_timeout(operation, self.timeout(), async move {
            tokio::task::spawn_blocking(move || f(&db)).await?
        })
        .await
    }
}

impl std::fmt::Debug for RedbMetastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbMetastore")
            .field("open", &self.db.read().is_some())
            .field("delete_markers", &self.delete_markers)
            .field("timeout", &*self.timeout.read())
            .finish()
    }
}

#[async_trait]
impl Metastore for RedbMetastore {
    fn name(&self) -> &'static str {
        "redb"
    }

    async fn initialize(&self, location: &str) -> MetaStoreResult<()> {
        if self.db.read().is_some() {
            debug!("Redb metastore already open, ignoring '{}'", location);
            return Ok(());
        }
        let path = location.to_string();
        let db = with_timeout("initialize", self.timeout(), async move {
            tokio::task::spawn_blocking(move || open_database(Path::new(&path))).await?
        })
        .await?;

        let mut slot = self.db.write();
        if slot.is_none() {
            *slot = Some(Arc::new(db));
            info!("Opened redb metastore at {}", location);
        }
        Ok(())
    }

    async fn add(&self, path: &StorePath, is_directory: bool) -> MetaStoreResult<()> {
        let records = vec![FileInfo::new(path.clone(), is_directory)];
        self.run("add", move |db| put_records(db, &records)).await
    }

    async fn add_all(&self, records: &[FileInfo]) -> MetaStoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let records = records.to_vec();
        self.run("add_all", move |db| put_records(db, &records))
            .await
    }

    async fn list(&self, paths: &[StorePath]) -> MetaStoreResult<Vec<FileInfo>> {
        let prefixes: Vec<String> = paths.iter().map(StorePath::child_prefix).collect();
        self.run("list", move |db| list_children(db, &prefixes)).await
    }

    async fn delete(&self, path: &StorePath) -> MetaStoreResult<()> {
        let paths = vec![path.clone()];
        let markers = self.delete_markers;
        self.run("delete", move |db| remove_records(db, &paths, markers))
            .await
    }

    async fn delete_all(&self, paths: &[StorePath]) -> MetaStoreResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let paths = paths.to_vec();
        let markers = self.delete_markers;
        self.run("delete_all", move |db| remove_records(db, &paths, markers))
            .await
    }

    async fn purge_tombstones(&self, older_than_millis: i64) -> MetaStoreResult<usize> {
        self.run("purge_tombstones", move |db| {
            purge_tombstones(db, older_than_millis)
        })
        .await
    }

    async fn close(&self) -> MetaStoreResult<()> {
        if self.db.write().take().is_some() {
            info!("Closed redb metastore");
        }
        Ok(())
    }

    fn timeout(&self) -> Duration {
        *self.timeout.read()
    }

    fn set_timeout(&self, timeout: Duration) {
        *self.timeout.write() = timeout;
    }
}

/// Open the database and create the table eagerly so later read txns don't fail
fn open_database(path: &Path) -> MetaStoreResult<Database> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::create(path)?;
    let write_txn = db.begin_write()?;
    {
        let _t = write_txn.open_table(tables::FILES)?;
    }
    write_txn.commit()?;
    Ok(db)
}

fn put_records(db: &Database, records: &[FileInfo]) -> MetaStoreResult<()> {
    let write_txn = db.begin_write()?;
    {
        let mut table = write_txn.open_table(tables::FILES)?;
        for info in records {
            let bytes = bincode::serialize(info)?;
            table.insert(info.key().as_str(), bytes.as_slice())?;
        }
    }
    write_txn.commit()?;
    Ok(())
}

fn list_children(db: &Database, prefixes: &[String]) -> MetaStoreResult<Vec<FileInfo>> {
    let read_txn = db.begin_read()?;
    let table = read_txn.open_table(tables::FILES)?;
    let mut found = BTreeMap::new();
    for prefix in prefixes {
        for entry in table.range(prefix.as_str()..)? {
            let (key_guard, value_guard) = entry?;
            let key = key_guard.value();
            if !key.starts_with(prefix.as_str()) {
                break;
            }
            if !is_direct_child(key, prefix) {
                continue;
            }
            match bincode::deserialize::<FileInfo>(value_guard.value()) {
                Ok(info) => {
                    found.insert(key.to_string(), info);
                }
                Err(e) => error!("Failed to decode record '{}': {}", key, e),
            }
        }
    }
    Ok(found.into_values().collect())
}

fn remove_records(db: &Database, paths: &[StorePath], markers: bool) -> MetaStoreResult<()> {
    let write_txn = db.begin_write()?;
    {
        let mut table = write_txn.open_table(tables::FILES)?;
        for path in paths {
            let key = path.key();
            if markers {
                let existing = match table.get(key.as_str())? {
                    Some(guard) => Some(bincode::deserialize::<FileInfo>(guard.value())?),
                    None => None,
                };
                let tombstone = existing
                    .unwrap_or_else(|| FileInfo::new(path.clone(), false))
                    .into_tombstone();
                let bytes = bincode::serialize(&tombstone)?;
                table.insert(key.as_str(), bytes.as_slice())?;
            } else {
                table.remove(key.as_str())?;
            }
        }
    }
    write_txn.commit()?;
    Ok(())
}

fn purge_tombstones(db: &Database, older_than_millis: i64) -> MetaStoreResult<usize> {
    let write_txn = db.begin_write()?;
    let purged = {
        let mut table = write_txn.open_table(tables::FILES)?;
        let mut stale = Vec::new();
        for entry in table.iter()? {
            let (key_guard, value_guard) = entry?;
            match bincode::deserialize::<FileInfo>(value_guard.value()) {
                Ok(info) if info.deleted && info.updated_at < older_than_millis => {
                    stale.push(key_guard.value().to_string());
                }
                Ok(_) => {}
                Err(e) => error!("Failed to decode record '{}': {}", key_guard.value(), e),
            }
        }
        for key in &stale {
            table.remove(key.as_str())?;
        }
        stale.len()
    };
    write_txn.commit()?;
    Ok(purged)
}
