//! Object-store hook interface
//!
//! [`ObjectStore`] is the storage-operation surface the consistency layer
//! sits in front of. The host implements it over its real client; the
//! layer's [`ConsistentStore`](crate::layer::ConsistentStore) implements it
//! again so the two compose transparently.

use crate::error::StoreResult;
use async_trait::async_trait;
use listguard_common::{CreateKind, FileStatus, StorePath};
use std::sync::Arc;

/// Storage operations intercepted by the consistency layer
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create an object or directory; `false` reports a refused create
    async fn create(&self, path: &StorePath, kind: CreateKind) -> StoreResult<bool>;

    /// Direct children of `path` as currently reported by the store
    async fn list_status(&self, path: &StorePath) -> StoreResult<Vec<FileStatus>>;

    /// Status of `path`, `None` when it does not exist
    async fn file_status(&self, path: &StorePath) -> StoreResult<Option<FileStatus>>;

    /// Rename `src` to `dst`; `false` reports a refused rename
    async fn rename(&self, src: &StorePath, dst: &StorePath) -> StoreResult<bool>;

    /// Delete `path`, descending into directories when `recursive`
    async fn delete(&self, path: &StorePath, recursive: bool) -> StoreResult<bool>;
}

#[async_trait]
impl<S: ObjectStore + ?Sized> ObjectStore for Arc<S> {
    async fn create(&self, path: &StorePath, kind: CreateKind) -> StoreResult<bool> {
        (**self).create(path, kind).await
    }

    async fn list_status(&self, path: &StorePath) -> StoreResult<Vec<FileStatus>> {
        (**self).list_status(path).await
    }

    async fn file_status(&self, path: &StorePath) -> StoreResult<Option<FileStatus>> {
        (**self).file_status(path).await
    }

    async fn rename(&self, src: &StorePath, dst: &StorePath) -> StoreResult<bool> {
        (**self).rename(src, dst).await
    }

    async fn delete(&self, path: &StorePath, recursive: bool) -> StoreResult<bool> {
        (**self).delete(path, recursive).await
    }
}
