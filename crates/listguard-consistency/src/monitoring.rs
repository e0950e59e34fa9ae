//! Engine decorator recording per-operation metrics
//!
//! Every engine operation records a latency sample and an ok or error count
//! (labelled by error kind) under the `engine` scope. The proceed callback is
//! observed separately as `<op>-proceed`, so store latency can be told apart
//! from reconciliation overhead. Control flow is never altered.

use crate::engine::{ConsistencyEngine, ops};
use crate::error::{ConsistencyError, StoreError, StoreResult};
use crate::store::ObjectStore;
use listguard_common::metrics::OperationTimer;
use listguard_common::{
    ConsistencyConfig, CreateKind, FileStatus, InvocationContext, MetricsRegistry, StorePath,
};
use std::future::Future;
use std::sync::Arc;

const SCOPE: &str = "engine";

const CREATE_PROCEED: &str = "create-proceed";
const LIST_PROCEED: &str = "list-proceed";
const RENAME_PROCEED: &str = "rename-proceed";
const DELETE_PROCEED: &str = "delete-proceed";

trait ErrorKind {
    fn label(&self) -> &'static str;
}

impl ErrorKind for StoreError {
    fn label(&self) -> &'static str {
        self.kind()
    }
}

impl ErrorKind for ConsistencyError {
    fn label(&self) -> &'static str {
        self.kind()
    }
}

async fn observe<T, E: ErrorKind>(
    metrics: &MetricsRegistry,
    operation: &str,
    call: impl Future<Output = Result<T, E>>,
) -> Result<T, E> {
    let timer = OperationTimer::start();
    let result = call.await;
    match &result {
        Ok(_) => metrics.record_success(SCOPE, operation, timer.elapsed_us()),
        Err(e) => metrics.record_failure(SCOPE, operation, e.label(), timer.elapsed_us()),
    }
    result
}

/// Observing wrapper around a [`ConsistencyEngine`]
pub struct MonitoredEngine {
    engine: ConsistencyEngine,
    metrics: Arc<MetricsRegistry>,
}

impl MonitoredEngine {
    pub fn new(engine: ConsistencyEngine, metrics: Arc<MetricsRegistry>) -> Self {
        Self { engine, metrics }
    }

    #[must_use]
    pub const fn engine(&self) -> &ConsistencyEngine {
        &self.engine
    }

    pub async fn record_create<F, Fut>(
        &self,
        ctx: &InvocationContext,
        path: &StorePath,
        kind: CreateKind,
        proceed: F,
    ) -> Result<bool, ConsistencyError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StoreResult<bool>>,
    {
        let metrics = &self.metrics;
        observe(
            metrics,
            ops::CREATE,
            self.engine.record_create(ctx, path, kind, move || {
                observe(metrics, CREATE_PROCEED, proceed())
            }),
        )
        .await
    }

    pub async fn reconcile_listing<P, F, Fut>(
        &self,
        ctx: &InvocationContext,
        probe: &P,
        targets: &[StorePath],
        mut proceed: F,
    ) -> Result<Vec<FileStatus>, ConsistencyError>
    where
        P: ObjectStore + ?Sized,
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<Vec<FileStatus>>>,
    {
        let metrics = &self.metrics;
        observe(
            metrics,
            ops::LIST,
            self.engine.reconcile_listing(ctx, probe, targets, || {
                observe(metrics, LIST_PROCEED, proceed())
            }),
        )
        .await
    }

    pub async fn propagate_rename<P, F, Fut>(
        &self,
        ctx: &InvocationContext,
        probe: &P,
        src: &StorePath,
        dst: &StorePath,
        proceed: F,
    ) -> Result<bool, ConsistencyError>
    where
        P: ObjectStore + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = StoreResult<bool>>,
    {
        let metrics = &self.metrics;
        observe(
            metrics,
            ops::RENAME,
            self.engine.propagate_rename(ctx, probe, src, dst, move || {
                observe(metrics, RENAME_PROCEED, proceed())
            }),
        )
        .await
    }

    pub async fn propagate_delete<P, F, Fut>(
        &self,
        ctx: &InvocationContext,
        probe: &P,
        path: &StorePath,
        recursive: bool,
        proceed: F,
    ) -> Result<bool, ConsistencyError>
    where
        P: ObjectStore + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = StoreResult<bool>>,
    {
        let metrics = &self.metrics;
        observe(
            metrics,
            ops::DELETE,
            self.engine.propagate_delete(ctx, probe, path, recursive, move || {
                observe(metrics, DELETE_PROCEED, proceed())
            }),
        )
        .await
    }
}

/// The engine a layer hands out: plain, or wrapped for monitoring
pub enum EngineHandle {
    Plain(ConsistencyEngine),
    Monitored(MonitoredEngine),
}

impl EngineHandle {
    #[must_use]
    pub const fn config(&self) -> &ConsistencyConfig {
        match self {
            Self::Plain(engine) => engine.config(),
            Self::Monitored(monitored) => monitored.engine().config(),
        }
    }

    #[must_use]
    pub const fn is_monitored(&self) -> bool {
        matches!(self, Self::Monitored(_))
    }

    pub async fn record_create<F, Fut>(
        &self,
        ctx: &InvocationContext,
        path: &StorePath,
        kind: CreateKind,
        proceed: F,
    ) -> Result<bool, ConsistencyError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StoreResult<bool>>,
    {
        match self {
            Self::Plain(engine) => engine.record_create(ctx, path, kind, proceed).await,
            Self::Monitored(monitored) => monitored.record_create(ctx, path, kind, proceed).await,
        }
    }

    pub async fn reconcile_listing<P, F, Fut>(
        &self,
        ctx: &InvocationContext,
        probe: &P,
        targets: &[StorePath],
        proceed: F,
    ) -> Result<Vec<FileStatus>, ConsistencyError>
    where
        P: ObjectStore + ?Sized,
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<Vec<FileStatus>>>,
    {
        match self {
            Self::Plain(engine) => engine.reconcile_listing(ctx, probe, targets, proceed).await,
            Self::Monitored(monitored) => {
                monitored
                    .reconcile_listing(ctx, probe, targets, proceed)
                    .await
            }
        }
    }

    pub async fn propagate_rename<P, F, Fut>(
        &self,
        ctx: &InvocationContext,
        probe: &P,
        src: &StorePath,
        dst: &StorePath,
        proceed: F,
    ) -> Result<bool, ConsistencyError>
    where
        P: ObjectStore + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = StoreResult<bool>>,
    {
        match self {
            Self::Plain(engine) => engine.propagate_rename(ctx, probe, src, dst, proceed).await,
            Self::Monitored(monitored) => {
                monitored
                    .propagate_rename(ctx, probe, src, dst, proceed)
                    .await
            }
        }
    }

    pub async fn propagate_delete<P, F, Fut>(
        &self,
        ctx: &InvocationContext,
        probe: &P,
        path: &StorePath,
        recursive: bool,
        proceed: F,
    ) -> Result<bool, ConsistencyError>
    where
        P: ObjectStore + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = StoreResult<bool>>,
    {
        match self {
            Self::Plain(engine) => {
                engine
                    .propagate_delete(ctx, probe, path, recursive, proceed)
                    .await
            }
            Self::Monitored(monitored) => {
                monitored
                    .propagate_delete(ctx, probe, path, recursive, proceed)
                    .await
            }
        }
    }
}
