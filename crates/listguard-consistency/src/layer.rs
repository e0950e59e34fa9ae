//! Consistency layer and the object-store middleware built on it
//!
//! A [`ConsistencyLayer`] owns everything shared by the hooked calls of one
//! process: the property source, the disable latch, the metastore and
//! dispatcher (created once, on first use), the metrics registry and the
//! root cancellation token. [`ConsistentStore`] wraps a real
//! [`ObjectStore`] and routes each call through the layer.
//!
//! Every call resolves a fresh [`ConsistencyConfig`] snapshot, so property
//! changes take effect on the next call. Component selection (backend,
//! dispatcher, metastore monitoring) is fixed at initialization.

use crate::engine::ConsistencyEngine;
use crate::error::{ConsistencyError, StoreResult};
use crate::monitoring::{EngineHandle, MonitoredEngine};
use crate::recheck::RecheckScheduler;
use crate::store::ObjectStore;
use async_trait::async_trait;
use listguard_alert::{AlertDispatcher, DispatcherFactory};
use listguard_common::{
    ConsistencyConfig, CreateKind, FileStatus, InvocationContext, MetricsRegistry, Properties,
    StorePath,
};
use listguard_meta_store::{Metastore, MetastoreFactory, MonitoringMetastore};
use std::slice;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Shared collaborators, created on first use
struct Components {
    metastore: Arc<dyn Metastore>,
    dispatcher: Arc<dyn AlertDispatcher>,
}

/// Process-wide state of the consistency layer
pub struct ConsistencyLayer {
    properties: Arc<Properties>,
    latched: AtomicBool,
    /// Set once an engine has been handed out
    activated: AtomicBool,
    components: OnceCell<Components>,
    metastore_factory: MetastoreFactory,
    dispatcher_factory: DispatcherFactory,
    metrics: Arc<MetricsRegistry>,
    cancel: CancellationToken,
}

impl ConsistencyLayer {
    /// Create a layer reading its configuration from `properties`
    pub fn new(properties: Arc<Properties>) -> Self {
        Self {
            properties,
            latched: AtomicBool::new(false),
            activated: AtomicBool::new(false),
            components: OnceCell::new(),
            metastore_factory: MetastoreFactory::new(),
            dispatcher_factory: DispatcherFactory::new(),
            metrics: Arc::new(MetricsRegistry::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Use a factory with additional metastore backends
    #[must_use]
    pub fn with_metastore_factory(mut self, factory: MetastoreFactory) -> Self {
        self.metastore_factory = factory;
        self
    }

    /// Use a factory with additional dispatchers
    #[must_use]
    pub fn with_dispatcher_factory(mut self, factory: DispatcherFactory) -> Self {
        self.dispatcher_factory = factory;
        self
    }

    /// Use ready-made components instead of resolving them from configuration
    ///
    /// The metastore is expected to be initialized already.
    #[must_use]
    pub fn with_components(
        mut self,
        metastore: Arc<dyn Metastore>,
        dispatcher: Arc<dyn AlertDispatcher>,
    ) -> Self {
        self.components = OnceCell::new_with(Some(Components {
            metastore,
            dispatcher,
        }));
        self
    }

    #[must_use]
    pub const fn properties(&self) -> &Arc<Properties> {
        &self.properties
    }

    #[must_use]
    pub const fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Root token; cancelling it aborts every pending recheck wait
    #[must_use]
    pub const fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Turn the layer off for the rest of its lifetime
    pub fn disable(&self) {
        if !self.latched.swap(true, Ordering::AcqRel) {
            warn!("Consistency layer disabled");
        }
    }

    /// Whether the disable latch is set
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.latched.load(Ordering::Acquire)
    }

    /// Current configuration snapshot
    pub fn config(&self) -> listguard_common::Result<ConsistencyConfig> {
        ConsistencyConfig::from_properties(&self.properties)
    }

    /// Create the shared components now instead of on the first hooked call
    pub async fn initialize(&self) -> Result<(), ConsistencyError> {
        self.engine().await.map(|_| ())
    }

    /// Engine for one call, or `None` when calls must pass straight through
    ///
    /// A `disable` property seen after the layer has been active sets the
    /// disable latch, as do initialization failures. The latter are returned
    /// only when `fail_on_error` is configured.
    pub async fn engine(&self) -> Result<Option<EngineHandle>, ConsistencyError> {
        if self.is_disabled() {
            return Ok(None);
        }

        let config = match self.config() {
            Ok(config) => config,
            Err(e) => {
                warn!("Invalid consistency configuration, passing through: {}", e);
                return Ok(None);
            }
        };
        if config.disabled {
            if self.activated.load(Ordering::Acquire) {
                self.disable();
            }
            return Ok(None);
        }

        let components = match self
            .components
            .get_or_try_init(|| self.build_components(&config))
            .await
        {
            Ok(components) => components,
            Err(e) => {
                self.disable();
                error!("Consistency layer initialization failed: {}", e);
                if config.fail_on_error {
                    return Err(e);
                }
                return Ok(None);
            }
        };

        self.activated.store(true, Ordering::Release);
        let monitored = config.is_monitoring();
        let engine = ConsistencyEngine::new(
            config,
            components.metastore.clone(),
            components.dispatcher.clone(),
            RecheckScheduler::new(self.cancel.child_token()),
        );
        Ok(Some(if monitored {
            EngineHandle::Monitored(MonitoredEngine::new(engine, self.metrics.clone()))
        } else {
            EngineHandle::Plain(engine)
        }))
    }

    async fn build_components(
        &self,
        config: &ConsistencyConfig,
    ) -> Result<Components, ConsistencyError> {
        let settings = &config.metastore;
        let metastore = self
            .metastore_factory
            .create(settings)
            .map_err(|e| ConsistencyError::Initialization(e.to_string()))?;
        metastore
            .initialize(&settings.location)
            .await
            .map_err(|e| {
                ConsistencyError::Initialization(format!(
                    "{} metastore at {}: {}",
                    settings.implementation, settings.location, e
                ))
            })?;
        let metastore: Arc<dyn Metastore> = if config.is_monitoring() {
            Arc::new(MonitoringMetastore::new(metastore, self.metrics.clone()))
        } else {
            metastore
        };

        let dispatcher = self
            .dispatcher_factory
            .create(&config.dispatcher.implementation, &self.metrics)
            .map_err(|e| ConsistencyError::Initialization(e.to_string()))?;

        info!(
            metastore = metastore.name(),
            dispatcher = dispatcher.name(),
            monitoring = config.is_monitoring(),
            "Consistency layer initialized"
        );
        Ok(Components {
            metastore,
            dispatcher,
        })
    }

    /// Cancel pending rechecks and close the metastore
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(components) = self.components.get() {
            if let Err(e) = components.metastore.close().await {
                warn!("Failed to close metastore: {}", e);
            }
        }
        debug!("Consistency layer shut down");
    }
}

/// Object store with listing reconciliation and metadata propagation
///
/// The wrapped store doubles as the probe for rename preconditions,
/// status lookups of missing paths and recursive delete enumeration.
pub struct ConsistentStore<S> {
    inner: Arc<S>,
    layer: Arc<ConsistencyLayer>,
    context: InvocationContext,
}

impl<S: ObjectStore> ConsistentStore<S> {
    /// Wrap `inner` for calls made by the coordinating process
    pub fn new(inner: Arc<S>, layer: Arc<ConsistencyLayer>) -> Self {
        Self {
            inner,
            layer,
            context: InvocationContext::Driver,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: InvocationContext) -> Self {
        self.context = context;
        self
    }

    /// A handle for calls made inside task `task_id`, sharing store and layer
    #[must_use]
    pub fn for_task(&self, task_id: impl Into<String>) -> Self {
        Self {
            inner: self.inner.clone(),
            layer: self.layer.clone(),
            context: InvocationContext::task(task_id),
        }
    }

    #[must_use]
    pub const fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    #[must_use]
    pub const fn layer(&self) -> &Arc<ConsistencyLayer> {
        &self.layer
    }

    #[must_use]
    pub const fn context(&self) -> &InvocationContext {
        &self.context
    }

    /// Reconciled listing of several directories, checked as one
    pub async fn list_many(&self, paths: &[StorePath]) -> StoreResult<Vec<FileStatus>> {
        let inner = &*self.inner;
        let Some(engine) = self.layer.engine().await? else {
            return list_all(inner, paths).await;
        };
        Ok(engine
            .reconcile_listing(&self.context, inner, paths, || list_all(inner, paths))
            .await?)
    }
}

async fn list_all<S: ObjectStore + ?Sized>(
    store: &S,
    paths: &[StorePath],
) -> StoreResult<Vec<FileStatus>> {
    let mut listing = Vec::new();
    for path in paths {
        listing.extend(store.list_status(path).await?);
    }
    Ok(listing)
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for ConsistentStore<S> {
    async fn create(&self, path: &StorePath, kind: CreateKind) -> StoreResult<bool> {
        let Some(engine) = self.layer.engine().await? else {
            return self.inner.create(path, kind).await;
        };
        Ok(engine
            .record_create(&self.context, path, kind, || self.inner.create(path, kind))
            .await?)
    }

    async fn list_status(&self, path: &StorePath) -> StoreResult<Vec<FileStatus>> {
        let Some(engine) = self.layer.engine().await? else {
            return self.inner.list_status(path).await;
        };
        Ok(engine
            .reconcile_listing(&self.context, &*self.inner, slice::from_ref(path), || {
                self.inner.list_status(path)
            })
            .await?)
    }

    async fn file_status(&self, path: &StorePath) -> StoreResult<Option<FileStatus>> {
        self.inner.file_status(path).await
    }

    async fn rename(&self, src: &StorePath, dst: &StorePath) -> StoreResult<bool> {
        let Some(engine) = self.layer.engine().await? else {
            return self.inner.rename(src, dst).await;
        };
        Ok(engine
            .propagate_rename(&self.context, &*self.inner, src, dst, || {
                self.inner.rename(src, dst)
            })
            .await?)
    }

    async fn delete(&self, path: &StorePath, recursive: bool) -> StoreResult<bool> {
        let Some(engine) = self.layer.engine().await? else {
            return self.inner.delete(path, recursive).await;
        };
        Ok(engine
            .propagate_delete(&self.context, &*self.inner, path, recursive, || {
                self.inner.delete(path, recursive)
            })
            .await?)
    }
}
