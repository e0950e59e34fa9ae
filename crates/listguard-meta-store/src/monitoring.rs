//! Metastore decorator recording per-call metrics
//!
//! Results pass through unchanged; every call records its latency and an
//! ok or error count (labelled by error kind) under the `metastore` scope.

use crate::error::MetaStoreResult;
use crate::metastore::Metastore;
use async_trait::async_trait;
use listguard_common::metrics::OperationTimer;
use listguard_common::{FileInfo, MetricsRegistry, StorePath};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const SCOPE: &str = "metastore";

/// Observing wrapper around another metastore
pub struct MonitoringMetastore {
    inner: Arc<dyn Metastore>,
    metrics: Arc<MetricsRegistry>,
}

impl MonitoringMetastore {
    pub fn new(inner: Arc<dyn Metastore>, metrics: Arc<MetricsRegistry>) -> Self {
        Self { inner, metrics }
    }

    async fn observe<T>(
        &self,
        operation: &str,
        call: impl Future<Output = MetaStoreResult<T>>,
    ) -> MetaStoreResult<T> {
        let timer = OperationTimer::start();
        let result = call.await;
        match &result {
            Ok(_) => self
                .metrics
                .record_success(SCOPE, operation, timer.elapsed_us()),
            Err(e) => self
                .metrics
                .record_failure(SCOPE, operation, e.kind(), timer.elapsed_us()),
        }
        result
    }
}

#[async_trait]
impl Metastore for MonitoringMetastore {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn initialize(&self, location: &str) -> MetaStoreResult<()> {
        self.observe("initialize", self.inner.initialize(location))
            .await
    }

    async fn add(&self, path: &StorePath, is_directory: bool) -> MetaStoreResult<()> {
        self.observe("add", self.inner.add(path, is_directory)).await
    }

    async fn add_all(&self, records: &[FileInfo]) -> MetaStoreResult<()> {
        self.observe("add_all", self.inner.add_all(records)).await
    }

    async fn list(&self, paths: &[StorePath]) -> MetaStoreResult<Vec<FileInfo>> {
        self.observe("list", self.inner.list(paths)).await
    }

    async fn delete(&self, path: &StorePath) -> MetaStoreResult<()> {
        self.observe("delete", self.inner.delete(path)).await
    }

    async fn delete_all(&self, paths: &[StorePath]) -> MetaStoreResult<()> {
        self.observe("delete_all", self.inner.delete_all(paths)).await
    }

    async fn purge_tombstones(&self, older_than_millis: i64) -> MetaStoreResult<usize> {
        self.observe(
            "purge_tombstones",
            self.inner.purge_tombstones(older_than_millis),
        )
        .await
    }

    async fn close(&self) -> MetaStoreResult<()> {
        self.observe("close", self.inner.close()).await
    }

    fn timeout(&self) -> Duration {
        self.inner.timeout()
    }

    fn set_timeout(&self, timeout: Duration) {
        self.inner.set_timeout(timeout);
    }
}
