//! Delete propagation

use crate::engine::{ConsistencyEngine, ops};
use crate::error::{ConsistencyError, StoreResult};
use crate::store::ObjectStore;
use listguard_common::{InvocationContext, StorePath};
use listguard_meta_store::MetaStoreError;
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::slice;
use tracing::{debug, info};

impl ConsistencyEngine {
    /// Remove (or tombstone) the records of `path` and its descendants, then delete
    ///
    /// The record set is `path`, every metastore-known descendant and, for a
    /// recursive delete of a directory, every descendant the store reports.
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
        let mut targets = DeleteSet::new(path);

        if let Err(e) = self.collect_tracked(&mut targets, path).await {
            self.on_metastore_error(ctx, ops::DELETE, slice::from_ref(path), e)?;
        }
        if recursive {
            collect_listed(probe, &mut targets, path).await;
        }

        let paths = targets.into_paths();
        debug!("Deleting {} record(s) for {}", paths.len(), path);
        if let Err(e) = self.metastore.delete_all(&paths).await {
            self.on_metastore_error(ctx, ops::DELETE, slice::from_ref(path), e)?;
        }

        Ok(proceed().await?)
    }

    /// Metastore descendants of `path`, level by level
    async fn collect_tracked(
        &self,
        targets: &mut DeleteSet,
        path: &StorePath,
    ) -> Result<(), MetaStoreError> {
        let mut queue = VecDeque::from([path.clone()]);
        while let Some(parent) = queue.pop_front() {
            for child in self.metastore.list(slice::from_ref(&parent)).await? {
                if targets.insert(&child.path) {
                    queue.push_back(child.path);
                }
            }
        }
        Ok(())
    }
}

/// Descendants reported by the store; failures only narrow the set
async fn collect_listed<P>(probe: &P, targets: &mut DeleteSet, path: &StorePath)
where
    P: ObjectStore + ?Sized,
{
    match probe.file_status(path).await {
        Ok(Some(status)) if status.is_dir => {}
        Ok(_) => return,
        Err(e) => {
            info!("Could not stat {} for recursive delete: {}", path, e);
            return;
        }
    }

    let mut queue = VecDeque::from([path.clone()]);
    while let Some(dir) = queue.pop_front() {
        let listing = match probe.list_status(&dir).await {
            Ok(listing) => listing,
            Err(e) => {
                info!("Could not list {} for recursive delete: {}", dir, e);
                continue;
            }
        };
        for status in listing {
            if targets.insert(&status.path) && status.is_dir {
                queue.push_back(status.path);
            }
        }
    }
}

/// Ordered, de-duplicated set of paths to remove
struct DeleteSet {
    seen: HashSet<String>,
    paths: Vec<StorePath>,
}

impl DeleteSet {
    fn new(root: &StorePath) -> Self {
        Self {
            seen: HashSet::from([root.key()]),
            paths: vec![root.clone()],
        }
    }

    /// Returns false when `path` was already present
    fn insert(&mut self, path: &StorePath) -> bool {
        if !self.seen.insert(path.key()) {
            return false;
        }
        self.paths.push(path.clone());
        true
    }

    fn into_paths(self) -> Vec<StorePath> {
        self.paths
    }
}
