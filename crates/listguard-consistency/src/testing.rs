//! Test doubles: a scripted object store, a recording dispatcher and a
//! metastore with injectable faults.

use crate::error::{StoreError, StoreResult};
use crate::store::ObjectStore;
use async_trait::async_trait;
use listguard_alert::AlertDispatcher;
use listguard_common::{ConsistencyConfig, CreateKind, FileInfo, FileStatus, StorePath};
use listguard_meta_store::{InMemoryMetastore, MetaStoreError, MetaStoreResult, Metastore};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub fn p(s: &str) -> StorePath {
    StorePath::parse(s).unwrap()
}

pub fn statuses(paths: &[&str]) -> Vec<FileStatus> {
    paths.iter().map(|s| FileStatus::file(p(s), 0)).collect()
}

/// Enabled config with millisecond recheck periods
pub fn enabled_config() -> ConsistencyConfig {
    ConsistencyConfig {
        disabled: false,
        recheck_period_ms: 1,
        task_recheck_period_ms: 1,
        ..ConsistencyConfig::default()
    }
}

/// In-memory object store whose listings can be scripted to lag behind writes
#[derive(Default)]
pub struct ScriptedStore {
    entries: Mutex<BTreeMap<String, FileStatus>>,
    script: Mutex<VecDeque<Vec<FileStatus>>>,
    refuse: AtomicBool,
    fail_mutations: AtomicBool,
    fail_listing: AtomicBool,
    pub create_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub rename_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listings returned in order; the last one repeats
    pub fn script_listings(&self, listings: Vec<Vec<FileStatus>>) {
        *self.script.lock() = listings.into();
    }

    pub fn put_file(&self, path: &StorePath, len: u64) {
        self.entries
            .lock()
            .insert(path.key(), FileStatus::file(path.clone(), len));
    }

    pub fn put_dir(&self, path: &StorePath) {
        self.entries
            .lock()
            .insert(path.key(), FileStatus::directory(path.clone()));
    }

    pub fn contains(&self, path: &StorePath) -> bool {
        self.entries.lock().contains_key(&path.key())
    }

    /// Report `false` from every mutation
    pub fn refuse_mutations(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    /// Fail every mutation with a backend error
    pub fn fail_mutations(&self) {
        self.fail_mutations.store(true, Ordering::SeqCst);
    }

    pub fn fail_listing(&self) {
        self.fail_listing.store(true, Ordering::SeqCst);
    }

    fn check_mutation(&self) -> StoreResult<bool> {
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(StoreError::backend("injected store failure"));
        }
        Ok(!self.refuse.load(Ordering::SeqCst))
    }

    fn status_locked(
        entries: &BTreeMap<String, FileStatus>,
        path: &StorePath,
    ) -> Option<FileStatus> {
        if path.is_root() {
            return Some(FileStatus::directory(path.clone()));
        }
        if let Some(status) = entries.get(&path.key()) {
            return Some(status.clone());
        }
        let prefix = path.child_prefix();
        entries
            .keys()
            .any(|k| k.starts_with(&prefix))
            .then(|| FileStatus::directory(path.clone()))
    }
}

#[async_trait]
impl ObjectStore for ScriptedStore {
    async fn create(&self, path: &StorePath, kind: CreateKind) -> StoreResult<bool> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if !self.check_mutation()? {
            return Ok(false);
        }
        match kind {
            CreateKind::File => self.put_file(path, 0),
            CreateKind::Directory => self.put_dir(path),
        }
        Ok(true)
    }

    async fn list_status(&self, path: &StorePath) -> StoreResult<Vec<FileStatus>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(StoreError::backend("injected listing failure"));
        }
        {
            let mut script = self.script.lock();
            if script.len() > 1 {
                return Ok(script.pop_front().unwrap());
            }
            if let Some(last) = script.front() {
                return Ok(last.clone());
            }
        }
        let prefix = path.child_prefix();
        let entries = self.entries.lock();
        let mut children: BTreeMap<String, FileStatus> = BTreeMap::new();
        for (key, status) in entries.iter() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                None if !rest.is_empty() => {
                    children.insert(key.clone(), status.clone());
                }
                Some((name, _)) => {
                    let dir = path.join(name);
                    children
                        .entry(dir.key())
                        .or_insert_with(|| FileStatus::directory(dir));
                }
                None => {}
            }
        }
        Ok(children.into_values().collect())
    }

    async fn file_status(&self, path: &StorePath) -> StoreResult<Option<FileStatus>> {
        Ok(Self::status_locked(&self.entries.lock(), path))
    }

    async fn rename(&self, src: &StorePath, dst: &StorePath) -> StoreResult<bool> {
        self.rename_calls.fetch_add(1, Ordering::SeqCst);
        if !self.check_mutation()? {
            return Ok(false);
        }
        let mut entries = self.entries.lock();
        let target = match Self::status_locked(&entries, dst) {
            Some(status) if status.is_dir => dst.join(src.name()),
            Some(_) => return Ok(false),
            None => dst.clone(),
        };
        let src_key = src.key();
        let prefix = src.child_prefix();
        let moved: Vec<String> = entries
            .keys()
            .filter(|k| **k == src_key || k.starts_with(&prefix))
            .cloned()
            .collect();
        if moved.is_empty() {
            return Ok(false);
        }
        for key in moved {
            let Some(mut status) = entries.remove(&key) else {
                continue;
            };
            status.path = if key == src_key {
                target.clone()
            } else {
                target.join(&key[prefix.len()..])
            };
            entries.insert(status.path.key(), status);
        }
        Ok(true)
    }

    async fn delete(&self, path: &StorePath, recursive: bool) -> StoreResult<bool> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if !self.check_mutation()? {
            return Ok(false);
        }
        let mut entries = self.entries.lock();
        let key = path.key();
        let prefix = path.child_prefix();
        let has_children = entries.keys().any(|k| k.starts_with(&prefix));
        if has_children && !recursive {
            return Ok(false);
        }
        let existed = entries.remove(&key).is_some();
        entries.retain(|k, _| !k.starts_with(&prefix));
        Ok(existed || has_children)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Alert(Vec<StorePath>),
    Timeout(String, Vec<StorePath>),
    Recovered(Vec<StorePath>),
}

/// Dispatcher that keeps every event for inspection
#[derive(Default)]
pub struct RecordingDispatcher {
    events: Mutex<Vec<Event>>,
}

impl RecordingDispatcher {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn alerts(&self) -> Vec<Vec<StorePath>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Alert(paths) => Some(paths),
                _ => None,
            })
            .collect()
    }

    pub fn timeouts(&self) -> Vec<(String, Vec<StorePath>)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Timeout(op, paths) => Some((op, paths)),
                _ => None,
            })
            .collect()
    }

    pub fn recoveries(&self) -> Vec<Vec<StorePath>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Recovered(paths) => Some(paths),
                _ => None,
            })
            .collect()
    }
}

impl AlertDispatcher for RecordingDispatcher {
    fn name(&self) -> &str {
        "recording"
    }

    fn alert(&self, missing: &[StorePath]) {
        self.events.lock().push(Event::Alert(missing.to_vec()));
    }

    fn timeout(&self, operation: &str, paths: &[StorePath]) {
        self.events
            .lock()
            .push(Event::Timeout(operation.to_string(), paths.to_vec()));
    }

    fn recovered(&self, paths: &[StorePath]) {
        self.events.lock().push(Event::Recovered(paths.to_vec()));
    }
}

#[derive(Debug, Clone, Copy)]
enum Fault {
    Timeout,
    Backend,
}

/// In-memory metastore whose calls can be made to fail by operation name
pub struct FaultyMetastore {
    inner: InMemoryMetastore,
    faults: Mutex<HashMap<&'static str, Fault>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl Default for FaultyMetastore {
    fn default() -> Self {
        Self::with_markers(false)
    }
}

impl FaultyMetastore {
    pub fn with_markers(delete_markers: bool) -> Self {
        Self {
            inner: InMemoryMetastore::new(delete_markers, Duration::from_secs(5)),
            faults: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn fail_with_timeout(&self, operation: &'static str) {
        self.faults.lock().insert(operation, Fault::Timeout);
    }

    pub fn fail_with_backend(&self, operation: &'static str) {
        self.faults.lock().insert(operation, Fault::Backend);
    }

    pub fn heal(&self) {
        self.faults.lock().clear();
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls.lock().get(operation).copied().unwrap_or(0)
    }

    fn enter(&self, operation: &'static str) -> MetaStoreResult<()> {
        *self.calls.lock().entry(operation).or_default() += 1;
        match self.faults.lock().get(operation) {
            Some(Fault::Timeout) => Err(MetaStoreError::Timeout {
                operation,
                after: Duration::from_millis(1),
            }),
            Some(Fault::Backend) => Err(MetaStoreError::backend("injected metastore failure")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Metastore for FaultyMetastore {
    fn name(&self) -> &'static str {
        "faulty"
    }

    async fn initialize(&self, location: &str) -> MetaStoreResult<()> {
        self.enter("initialize")?;
        self.inner.initialize(location).await
    }

    async fn add(&self, path: &StorePath, is_directory: bool) -> MetaStoreResult<()> {
        self.enter("add")?;
        self.inner.add(path, is_directory).await
    }

    async fn add_all(&self, records: &[FileInfo]) -> MetaStoreResult<()> {
        self.enter("add_all")?;
        self.inner.add_all(records).await
    }

    async fn list(&self, paths: &[StorePath]) -> MetaStoreResult<Vec<FileInfo>> {
        self.enter("list")?;
        self.inner.list(paths).await
    }

    async fn delete(&self, path: &StorePath) -> MetaStoreResult<()> {
        self.enter("delete")?;
        self.inner.delete(path).await
    }

    async fn delete_all(&self, paths: &[StorePath]) -> MetaStoreResult<()> {
        self.enter("delete_all")?;
        self.inner.delete_all(paths).await
    }

    async fn purge_tombstones(&self, older_than_millis: i64) -> MetaStoreResult<usize> {
        self.enter("purge_tombstones")?;
        self.inner.purge_tombstones(older_than_millis).await
    }

    async fn close(&self) -> MetaStoreResult<()> {
        self.enter("close")?;
        self.inner.close().await
    }

    fn timeout(&self) -> Duration {
        self.inner.timeout()
    }

    fn set_timeout(&self, timeout: Duration) {
        self.inner.set_timeout(timeout);
    }
}
