//! Metastore contract
//!
//! A metastore is the strongly-consistent index of every path written
//! through the consistency layer. Implementations must be safe for
//! unsynchronized concurrent use once initialized.

use crate::error::{MetaStoreError, MetaStoreResult};
use async_trait::async_trait;
use listguard_common::{FileInfo, StorePath, now_millis};
use std::future::Future;
use std::time::Duration;

/// Durable index of path metadata
#[async_trait]
pub trait Metastore: Send + Sync {
    /// Backend name, as registered in the factory
    fn name(&self) -> &'static str;

    /// Prepare backing storage at `location`; idempotent
    async fn initialize(&self, location: &str) -> MetaStoreResult<()>;

    /// Upsert a live record, clearing any tombstone
    async fn add(&self, path: &StorePath, is_directory: bool) -> MetaStoreResult<()>;

    /// Upsert many records
    async fn add_all(&self, records: &[FileInfo]) -> MetaStoreResult<()>;

    /// Records that are direct children of any of `paths`, tombstones included
    async fn list(&self, paths: &[StorePath]) -> MetaStoreResult<Vec<FileInfo>>;

    /// Remove a record, or tombstone it when delete markers are enabled
    async fn delete(&self, path: &StorePath) -> MetaStoreResult<()>;

    /// Remove or tombstone many records
    async fn delete_all(&self, paths: &[StorePath]) -> MetaStoreResult<()>;

    /// Physically remove tombstones last updated before `older_than_millis`
    async fn purge_tombstones(&self, older_than_millis: i64) -> MetaStoreResult<usize>;

    /// Release backing resources
    async fn close(&self) -> MetaStoreResult<()>;

    /// Per-call timeout
    fn timeout(&self) -> Duration;

    fn set_timeout(&self, timeout: Duration);
}

/// Bound `fut` by `after`, mapping expiry to [`MetaStoreError::Timeout`]
pub async fn with_timeout<T>(
    operation: &'static str,
    after: Duration,
    fut: impl Future<Output = MetaStoreResult<T>>,
) -> MetaStoreResult<T> {
    tokio::time::timeout(after, fut)
        .await
        .unwrap_or_else(|_| Err(MetaStoreError::Timeout { operation, after }))
}

/// Purge cutoff for tombstones older than `age`
#[must_use]
pub fn cutoff_before(age: Duration) -> i64 {
    now_millis().saturating_sub(i64::try_from(age.as_millis()).unwrap_or(i64::MAX))
}

/// True when `key` names a direct child of the location whose child prefix is `prefix`
pub(crate) fn is_direct_child(key: &str, prefix: &str) -> bool {
    key.strip_prefix(prefix)
        .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
}
