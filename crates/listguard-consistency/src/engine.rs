//! Consistency engine
//!
//! Compares what the store lists against what the metastore knows was
//! written, retries incomplete listings, and keeps metadata in step with
//! creates, renames and deletes. The engine holds no state between calls:
//! everything it needs arrives as a config snapshot and shared handles.
//!
//! Metastore failures never decide the outcome of the real store operation.
//! They are reported and swallowed unless policy says otherwise:
//! timeouts are surfaced with `fail_on_timeout`, everything else with
//! [`ConsistencyEngine::should_fail`].

use crate::error::{ConsistencyError, StoreResult};
use crate::recheck::RecheckScheduler;
use crate::store::ObjectStore;
use listguard_alert::AlertDispatcher;
use listguard_common::{
    ConsistencyConfig, CreateKind, FileInfo, FileStatus, InvocationContext, StorePath,
};
use listguard_meta_store::{MetaStoreError, Metastore};
use std::collections::HashSet;
use std::future::Future;
use std::slice;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Operation names reported to dispatchers and logs
pub mod ops {
    pub const CREATE: &str = "create";
    pub const LIST: &str = "list";
    pub const RENAME: &str = "rename";
    pub const RENAME_CLEANUP: &str = "rename_cleanup";
    pub const DELETE: &str = "delete";
}

/// Retry allowance for one reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecheckBudget {
    /// Retries after the first listing
    pub count: u32,
    pub period: Duration,
}

/// The reconciliation core
pub struct ConsistencyEngine {
    pub(crate) config: ConsistencyConfig,
    pub(crate) metastore: Arc<dyn Metastore>,
    pub(crate) dispatcher: Arc<dyn AlertDispatcher>,
    scheduler: RecheckScheduler,
}

impl ConsistencyEngine {
    pub fn new(
        config: ConsistencyConfig,
        metastore: Arc<dyn Metastore>,
        dispatcher: Arc<dyn AlertDispatcher>,
        scheduler: RecheckScheduler,
    ) -> Self {
        Self {
            config,
            metastore,
            dispatcher,
            scheduler,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ConsistencyConfig {
        &self.config
    }

    /// Whether a non-timeout failure is surfaced in this context
    #[must_use]
    pub const fn should_fail(&self, ctx: &InvocationContext) -> bool {
        if ctx.is_task() {
            self.config.task_fail_on_error
        } else {
            self.config.fail_on_error
        }
    }

    /// Retry allowance in this context; `None` skips reconciliation
    #[must_use]
    pub const fn recheck_budget(&self, ctx: &InvocationContext) -> Option<RecheckBudget> {
        if ctx.is_task() {
            if !self.config.check_task_listings {
                return None;
            }
            Some(RecheckBudget {
                count: self.config.task_recheck_count,
                period: self.config.task_recheck_period(),
            })
        } else {
            Some(RecheckBudget {
                count: self.config.recheck_count,
                period: self.config.recheck_period(),
            })
        }
    }

    /// Apply the timeout / should-fail policy to a metastore failure
    pub(crate) fn on_metastore_error(
        &self,
        ctx: &InvocationContext,
        operation: &'static str,
        paths: &[StorePath],
        err: MetaStoreError,
    ) -> Result<(), ConsistencyError> {
        if err.is_timeout() {
            error!(operation, paths = paths.len(), "Metastore timeout: {}", err);
            self.dispatcher.timeout(operation, paths);
            if self.config.fail_on_timeout {
                return Err(ConsistencyError::Timeout {
                    operation,
                    source: err,
                });
            }
            return Ok(());
        }

        error!(operation, paths = paths.len(), "Metastore failure: {}", err);
        if self.should_fail(ctx) {
            return Err(ConsistencyError::Metastore {
                operation,
                source: err,
            });
        }
        Ok(())
    }

    /// Perform a create, then record the new path
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
        if !proceed().await? {
            debug!("Create of {} refused by store, not recorded", path);
            return Ok(false);
        }

        let is_directory = self.config.track_directories && kind == CreateKind::Directory;
        if let Err(e) = self.metastore.add(path, is_directory).await {
            self.on_metastore_error(ctx, ops::CREATE, slice::from_ref(path), e)?;
        }
        Ok(true)
    }

    /// List `targets` through `proceed` and repair the result against the metastore
    ///
    /// With darkload the caller always receives the first raw listing; every
    /// check still runs for its alerts and logs.
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
        let Some(budget) = self.recheck_budget(ctx) else {
            debug!("Skipping consistency check for {} listing", ctx);
            return Ok(proceed().await?);
        };

        let listing = proceed().await?;
        let original = self.config.darkload.then(|| listing.clone());

        let outcome = self
            .reconcile(ctx, probe, targets, listing, &mut proceed, budget)
            .await;

        match (outcome, original) {
            (Err(ConsistencyError::Cancelled), _) => Err(ConsistencyError::Cancelled),
            (Ok(_), Some(original)) => Ok(original),
            (Err(e), Some(original)) => {
                warn!("Darkload: returning raw listing despite: {}", e);
                Ok(original)
            }
            (outcome, None) => outcome,
        }
    }

    async fn reconcile<P, F, Fut>(
        &self,
        ctx: &InvocationContext,
        probe: &P,
        targets: &[StorePath],
        mut listing: Vec<FileStatus>,
        proceed: &mut F,
        budget: RecheckBudget,
    ) -> Result<Vec<FileStatus>, ConsistencyError>
    where
        P: ObjectStore + ?Sized,
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<Vec<FileStatus>>>,
    {
        let records = match self.metastore.list(targets).await {
            Ok(records) => records,
            Err(e) => {
                self.on_metastore_error(ctx, ops::LIST, targets, e)?;
                return Ok(listing);
            }
        };

        if self.config.stat_on_missing_file {
            return self.stat_missing(ctx, probe, &records, listing).await;
        }

        let mut attempt = 0;
        let mut missing;
        loop {
            missing = missing_paths(&records, &listing);
            if self.config.delist_deleted {
                delist(&mut listing, &records);
            }
            if missing.is_empty() {
                break;
            }
            if self.within_threshold(&records, &listing, missing.len()) {
                missing.clear();
                break;
            }
            if attempt >= budget.count {
                break;
            }

            info!(
                missing = missing.len(),
                "Rechecking consistency in {:?} (attempt {} of {})",
                budget.period,
                attempt + 1,
                budget.count
            );
            self.scheduler.wait(budget.period).await?;
            listing = proceed().await?;
            attempt += 1;
        }

        if !missing.is_empty() {
            self.dispatcher.alert(&missing);
            if self.should_fail(ctx) {
                return Err(ConsistencyError::Inconsistent { missing });
            }
            error!(
                missing = missing.len(),
                "Consistency check failed, proceeding with incomplete listing"
            );
        } else if attempt > 0 {
            info!("Listing achieved consistency after {} recheck(s)", attempt);
            self.dispatcher.recovered(targets);
        }
        Ok(listing)
    }

    /// Escape valve: accept a listing that holds enough of the expected entries
    #[allow(clippy::cast_precision_loss)]
    fn within_threshold(
        &self,
        records: &[FileInfo],
        listing: &[FileStatus],
        missing: usize,
    ) -> bool {
        let threshold = self.config.file_threshold;
        let expected = records.iter().filter(|r| !r.deleted).count();
        if threshold >= 1.0 || expected == 0 {
            return false;
        }
        let ratio = listing.len() as f32 / expected as f32;
        if ratio > threshold {
            info!(
                missing,
                "Proceeding with incomplete listing at ratio {:.3} ({:.3} acceptable)",
                ratio,
                threshold
            );
            return true;
        }
        false
    }

    /// Probe the store for each missing path instead of retrying
    async fn stat_missing<P>(
        &self,
        ctx: &InvocationContext,
        probe: &P,
        records: &[FileInfo],
        mut listing: Vec<FileStatus>,
    ) -> Result<Vec<FileStatus>, ConsistencyError>
    where
        P: ObjectStore + ?Sized,
    {
        for path in missing_paths(records, &listing) {
            match probe.file_status(&path).await {
                Ok(Some(status)) => {
                    debug!("Added {} to listing from direct status", path);
                    listing.push(status);
                }
                Ok(None) => debug!("Missing path {} not found in store", path),
                Err(e) => {
                    if self.should_fail(ctx) {
                        return Err(e.into());
                    }
                    warn!("Status probe for {} failed: {}", path, e);
                }
            }
        }
        Ok(listing)
    }
}

/// Live metastore records absent from `listing`
#[must_use]
pub fn missing_paths(records: &[FileInfo], listing: &[FileStatus]) -> Vec<StorePath> {
    let listed: HashSet<String> = listing.iter().map(|s| s.path.key()).collect();
    records
        .iter()
        .filter(|r| !r.deleted && !listed.contains(&r.key()))
        .map(|r| r.path.clone())
        .collect()
}

/// Drop listing entries whose metastore record is a tombstone; returns the count removed
pub fn delist(listing: &mut Vec<FileStatus>, records: &[FileInfo]) -> usize {
    let tombstones: HashSet<String> = records
        .iter()
        .filter(|r| r.deleted)
        .map(FileInfo::key)
        .collect();
    if tombstones.is_empty() {
        return 0;
    }
    let before = listing.len();
    listing.retain(|s| !tombstones.contains(&s.path.key()));
    before - listing.len()
}
