//! Rename propagation
//!
//! Metadata is mirrored to the destination before the real rename runs and
//! the source records are removed only after it succeeded, so a failed
//! rename never loses the metadata of the source tree.

use crate::engine::{ConsistencyEngine, ops};
use crate::error::{ConsistencyError, RenameRejection, StoreResult};
use crate::store::ObjectStore;
use listguard_common::{FileInfo, InvocationContext, StorePath};
use listguard_meta_store::MetaStoreError;
use std::future::Future;
use std::slice;
use tracing::{debug, info, warn};

/// Store-side facts about both ends of a rename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameInfo {
    pub src: StorePath,
    pub dst: StorePath,
    pub src_exists: bool,
    pub dst_exists: bool,
    pub src_is_file: bool,
    pub dst_is_file: bool,
}

impl RenameInfo {
    /// Query the store for both ends
    pub async fn probe<P>(probe: &P, src: &StorePath, dst: &StorePath) -> StoreResult<Self>
    where
        P: ObjectStore + ?Sized,
    {
        let src_status = probe.file_status(src).await?;
        let dst_status = probe.file_status(dst).await?;
        Ok(Self {
            src: src.clone(),
            dst: dst.clone(),
            src_exists: src_status.is_some(),
            dst_exists: dst_status.is_some(),
            src_is_file: src_status.as_ref().is_some_and(|s| !s.is_dir),
            dst_is_file: dst_status.as_ref().is_some_and(|s| !s.is_dir),
        })
    }

    /// Where the source lands: inside `dst` when it is an existing directory
    #[must_use]
    pub fn effective_destination(&self) -> StorePath {
        if self.dst_exists && !self.dst_is_file {
            self.dst.join(self.src.name())
        } else {
            self.dst.clone()
        }
    }
}

impl ConsistencyEngine {
    /// Perform a rename, keeping metastore records in step
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
        if src.is_root() {
            return Err(RenameRejection::Root(src.clone()).into());
        }

        let info = RenameInfo::probe(probe, src, dst).await?;
        self.check_rename(probe, &info).await?;

        let target = info.effective_destination();
        if target.key() == src.key() {
            debug!("Rename of {} onto itself, metadata unchanged", src);
            return Ok(proceed().await?);
        }

        if let Err(e) = self.mirror(&info, &target).await {
            self.on_metastore_error(ctx, ops::RENAME, slice::from_ref(src), e)?;
        }

        if !proceed().await? {
            warn!("Store refused rename {} -> {}, source metadata kept", src, dst);
            return Ok(false);
        }

        if let Err(e) = self.cleanup(src, &target).await {
            self.on_metastore_error(ctx, ops::RENAME_CLEANUP, slice::from_ref(src), e)?;
        }
        Ok(true)
    }

    async fn check_rename<P>(&self, probe: &P, info: &RenameInfo) -> Result<(), ConsistencyError>
    where
        P: ObjectStore + ?Sized,
    {
        if !info.src_exists {
            return Err(RenameRejection::SourceMissing(info.src.clone()).into());
        }
        if info.dst_is_file {
            return Err(RenameRejection::DestinationIsFile(info.dst.clone()).into());
        }
        if !info.dst_exists {
            if let Some(parent) = info.dst.parent().filter(|p| !p.is_root()) {
                if probe.file_status(&parent).await?.is_none() {
                    return Err(RenameRejection::DestinationParentMissing(info.dst.clone()).into());
                }
            }
        }
        Ok(())
    }

    /// Every record below `src`, tombstones included, parents before children
    ///
    /// Any record with children is descended into, whatever its directory
    /// flag. Records at or under `target` are left out.
    async fn source_tree(
        &self,
        src: &StorePath,
        target: &StorePath,
    ) -> Result<Vec<FileInfo>, MetaStoreError> {
        let mut tree: Vec<FileInfo> = Vec::new();
        let mut next = 0;
        let mut parent = src.clone();
        loop {
            for child in self.metastore.list(slice::from_ref(&parent)).await? {
                if child.path == *target || target.is_ancestor_of(&child.path) {
                    continue;
                }
                tree.push(child);
            }
            let Some(record) = tree.get(next) else {
                break;
            };
            parent = record.path.clone();
            next += 1;
        }
        Ok(tree)
    }

    /// Copy the source subtree's live records under `target`
    async fn mirror(&self, info: &RenameInfo, target: &StorePath) -> Result<(), MetaStoreError> {
        if info.src_is_file {
            return self.metastore.add(target, false).await;
        }

        self.metastore.add(target, true).await?;
        let mut mirrored = 0usize;
        for record in self.source_tree(&info.src, target).await? {
            if record.deleted {
                continue;
            }
            let Some(relative) = record.path.relative_to(&info.src) else {
                continue;
            };
            self.metastore.add(&target.join(&relative), record.is_directory).await?;
            mirrored += 1;
        }
        debug!("Mirrored {} record(s) from {} to {}", mirrored, info.src, target);
        Ok(())
    }

    /// Remove every record of the source subtree, descendants first
    async fn cleanup(&self, src: &StorePath, target: &StorePath) -> Result<(), MetaStoreError> {
        let mut ordered: Vec<StorePath> = self
            .source_tree(src, target)
            .await?
            .into_iter()
            .map(|record| record.path)
            .collect();
        ordered.insert(0, src.clone());
        ordered.reverse();
        info!("Removing {} record(s) under renamed source {}", ordered.len(), src);
        self.metastore.delete_all(&ordered).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recheck::RecheckScheduler;
    use crate::testing::{FaultyMetastore, RecordingDispatcher, ScriptedStore, enabled_config, p};
    use listguard_common::{ConsistencyConfig, CreateKind};
    use listguard_meta_store::{InMemoryMetastore, Metastore};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    fn engine(config: ConsistencyConfig, metastore: Arc<dyn Metastore>) -> ConsistencyEngine {
        engine_with(config, metastore, Arc::new(RecordingDispatcher::default()))
    }

    fn engine_with(
        config: ConsistencyConfig,
        metastore: Arc<dyn Metastore>,
        dispatcher: Arc<RecordingDispatcher>,
    ) -> ConsistencyEngine {
        ConsistencyEngine::new(config, metastore, dispatcher, RecheckScheduler::default())
    }

    async fn rename(
        e: &ConsistencyEngine,
        store: &ScriptedStore,
        src: &StorePath,
        dst: &StorePath,
    ) -> Result<bool, ConsistencyError> {
        e.propagate_rename(&InvocationContext::Driver, store, src, dst, || {
            store.rename(src, dst)
        })
        .await
    }

    #[tokio::test]
    async fn test_effective_destination() {
        let store = ScriptedStore::new();
        store.put_file(&p("s3://b/a/f"), 1);
        store.put_dir(&p("s3://b/out"));

        let info = RenameInfo::probe(&store, &p("s3://b/a"), &p("s3://b/out"))
            .await
            .unwrap();
        assert!(info.src_exists && !info.src_is_file);
        assert!(info.dst_exists && !info.dst_is_file);
        assert_eq!(info.effective_destination(), p("s3://b/out/a"));

        let info = RenameInfo::probe(&store, &p("s3://b/a/f"), &p("s3://b/g"))
            .await
            .unwrap();
        assert!(info.src_is_file && !info.dst_exists);
        assert_eq!(info.effective_destination(), p("s3://b/g"));
    }

    #[tokio::test]
    async fn test_rename_file() {
        let metastore = Arc::new(InMemoryMetastore::default());
        let store = ScriptedStore::new();
        let src = p("s3://b/d/part-0");
        store.put_file(&src, 10);
        metastore.add(&src, false).await.unwrap();
        let e = engine(enabled_config(), metastore.clone());

        let dst = p("s3://b/d/final-0");
        assert!(rename(&e, &store, &src, &dst).await.unwrap());
        assert!(metastore.get(&src).is_none());
        assert!(metastore.get(&dst).is_some());
        assert!(store.contains(&dst));
    }

    #[tokio::test]
    async fn test_rename_directory_tree() {
        let metastore = Arc::new(InMemoryMetastore::default());
        let store = ScriptedStore::new();
        for file in ["s3://b/tmp/a", "s3://b/tmp/sub/b"] {
            store.put_file(&p(file), 1);
            metastore.add(&p(file), false).await.unwrap();
        }
        metastore.add(&p("s3://b/tmp/sub"), true).await.unwrap();
        metastore.add(&p("s3://b/tmp"), true).await.unwrap();
        store.put_dir(&p("s3://b/out"));
        let e = engine(enabled_config(), metastore.clone());

        assert!(
            rename(&e, &store, &p("s3://b/tmp"), &p("s3://b/out"))
                .await
                .unwrap()
        );

        for moved in ["s3://b/out/tmp/a", "s3://b/out/tmp/sub/b"] {
            assert!(metastore.get(&p(moved)).is_some(), "{moved} not mirrored");
            assert!(store.contains(&p(moved)));
        }
        assert!(metastore.get(&p("s3://b/out/tmp/sub")).unwrap().is_directory);
        for gone in ["s3://b/tmp", "s3://b/tmp/a", "s3://b/tmp/sub", "s3://b/tmp/sub/b"] {
            assert!(metastore.get(&p(gone)).is_none(), "{gone} not cleaned up");
        }
    }

    #[tokio::test]
    async fn test_rename_root_rejected_without_mutation() {
        let metastore = Arc::new(InMemoryMetastore::default());
        metastore.add(&p("s3://b/a"), false).await.unwrap();
        let store = ScriptedStore::new();
        let e = engine(enabled_config(), metastore.clone());

        let err = rename(&e, &store, &p("s3://b/"), &p("s3://b/x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConsistencyError::Rejected(RenameRejection::Root(_))
        ));
        assert_eq!(store.rename_calls.load(Ordering::SeqCst), 0);
        assert_eq!(metastore.len(), 1);
    }

    #[tokio::test]
    async fn test_rename_rejections() {
        let metastore = Arc::new(InMemoryMetastore::default());
        let store = ScriptedStore::new();
        store.put_file(&p("s3://b/a"), 1);
        store.put_file(&p("s3://b/f"), 1);
        let e = engine(enabled_config(), metastore.clone());

        let err = rename(&e, &store, &p("s3://b/missing"), &p("s3://b/x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConsistencyError::Rejected(RenameRejection::SourceMissing(_))
        ));

        let err = rename(&e, &store, &p("s3://b/a"), &p("s3://b/f"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConsistencyError::Rejected(RenameRejection::DestinationIsFile(_))
        ));

        let err = rename(&e, &store, &p("s3://b/a"), &p("s3://b/no/such/x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConsistencyError::Rejected(RenameRejection::DestinationParentMissing(_))
        ));

        assert_eq!(store.rename_calls.load(Ordering::SeqCst), 0);
        assert!(metastore.is_empty());
    }

    #[tokio::test]
    async fn test_rename_store_failure_keeps_source_metadata() {
        let metastore = Arc::new(InMemoryMetastore::default());
        let store = ScriptedStore::new();
        let src = p("s3://b/d/part-0");
        let dst = p("s3://b/d/final-0");
        store.put_file(&src, 1);
        metastore.add(&src, false).await.unwrap();
        let e = engine(enabled_config(), metastore.clone());

        store.fail_mutations();
        let err = rename(&e, &store, &src, &dst).await.unwrap_err();
        assert!(err.is_store_error());
        assert!(!metastore.get(&src).unwrap().deleted);

        let store = ScriptedStore::new();
        store.put_file(&src, 1);
        store.refuse_mutations();
        assert!(!rename(&e, &store, &src, &dst).await.unwrap());
        assert!(metastore.get(&src).is_some());
    }

    #[tokio::test]
    async fn test_rename_into_own_subtree_terminates() {
        let metastore = Arc::new(InMemoryMetastore::default());
        let store = ScriptedStore::new();
        store.put_file(&p("s3://b/a/f"), 1);
        store.put_dir(&p("s3://b/a/inner"));
        metastore.add(&p("s3://b/a/f"), false).await.unwrap();
        metastore.add(&p("s3://b/a/inner"), true).await.unwrap();
        let e = engine(enabled_config(), metastore.clone());

        // Lands at a/inner/a; the fake store moves it, real stores may refuse
        let renamed = rename(&e, &store, &p("s3://b/a"), &p("s3://b/a/inner"))
            .await
            .unwrap();
        assert!(renamed);
        assert!(metastore.get(&p("s3://b/a/inner/a/f")).is_some());
        assert!(metastore.get(&p("s3://b/a/inner/a/inner/a")).is_none());
    }

    #[tokio::test]
    async fn test_rename_metastore_errors() {
        let metastore = Arc::new(FaultyMetastore::default());
        let src = p("s3://b/d/part-0");
        let dst = p("s3://b/d/final-0");
        metastore.add(&src, false).await.unwrap();

        // Swallowed: the rename still happens
        metastore.fail_with_backend("add");
        let store = ScriptedStore::new();
        store.put_file(&src, 1);
        let e = engine(enabled_config(), metastore.clone());
        assert!(rename(&e, &store, &src, &dst).await.unwrap());
        assert!(store.contains(&dst));

        // Surfaced: aborts before the store is touched
        let store = ScriptedStore::new();
        store.put_file(&src, 1);
        let mut config = enabled_config();
        config.fail_on_error = true;
        let e = engine(config, metastore.clone());
        let err = rename(&e, &store, &src, &dst).await.unwrap_err();
        assert!(matches!(
            err,
            ConsistencyError::Metastore { operation: "rename", .. }
        ));
        assert_eq!(store.rename_calls.load(Ordering::SeqCst), 0);

        // Cleanup timeout after a successful rename
        metastore.heal();
        metastore.fail_with_timeout("delete_all");
        let mut config = enabled_config();
        config.fail_on_timeout = true;
        let e = engine(config, metastore.clone());
        let err = rename(&e, &store, &src, &dst).await.unwrap_err();
        assert!(matches!(
            err,
            ConsistencyError::Timeout { operation: "rename_cleanup", .. }
        ));
        assert!(store.contains(&dst));
    }

    #[tokio::test]
    async fn test_rename_tree_recorded_without_directory_flags() {
        let metastore = Arc::new(InMemoryMetastore::default());
        let store = ScriptedStore::new();
        let e = engine(enabled_config(), metastore.clone());
        let ctx = InvocationContext::Driver;
        for (path, kind) in [
            ("s3://b/tmp", CreateKind::Directory),
            ("s3://b/tmp/sub", CreateKind::Directory),
            ("s3://b/tmp/sub/part-0", CreateKind::File),
        ] {
            let path = p(path);
            assert!(
                e.record_create(&ctx, &path, kind, || store.create(&path, kind))
                    .await
                    .unwrap()
            );
        }
        assert!(!metastore.get(&p("s3://b/tmp/sub")).unwrap().is_directory);

        assert!(
            rename(&e, &store, &p("s3://b/tmp"), &p("s3://b/out"))
                .await
                .unwrap()
        );
        for moved in ["s3://b/out/sub", "s3://b/out/sub/part-0"] {
            assert!(metastore.get(&p(moved)).is_some(), "{moved} not mirrored");
        }
        for gone in ["s3://b/tmp", "s3://b/tmp/sub", "s3://b/tmp/sub/part-0"] {
            assert!(metastore.get(&p(gone)).is_none(), "{gone} not cleaned up");
        }
    }

    #[tokio::test]
    async fn test_rename_into_current_parent_keeps_record() {
        let metastore = Arc::new(InMemoryMetastore::default());
        let store = ScriptedStore::new();
        let path = p("s3://b/d/f");
        store.put_file(&path, 1);
        metastore.add(&path, false).await.unwrap();
        let e = engine(enabled_config(), metastore.clone());

        assert!(rename(&e, &store, &path, &p("s3://b/d")).await.unwrap());
        assert!(!metastore.get(&path).unwrap().deleted);
        assert!(store.contains(&path));
        assert_eq!(store.rename_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rename_cleanup_drops_tombstones() {
        let metastore = Arc::new(InMemoryMetastore::default());
        let store = ScriptedStore::new();
        store.put_file(&p("s3://b/tmp/a"), 1);
        metastore.add(&p("s3://b/tmp/a"), false).await.unwrap();
        // Left behind while delete markers were on
        let tombstone = FileInfo::new(p("s3://b/tmp/old"), false).into_tombstone();
        metastore.add_all(&[tombstone]).await.unwrap();
        let e = engine(enabled_config(), metastore.clone());

        assert!(
            rename(&e, &store, &p("s3://b/tmp"), &p("s3://b/out"))
                .await
                .unwrap()
        );
        assert!(metastore.get(&p("s3://b/tmp/old")).is_none());
        assert!(metastore.get(&p("s3://b/out/old")).is_none());
        assert!(metastore.get(&p("s3://b/out/a")).is_some());
    }

    #[tokio::test]
    async fn test_rename_mirror_timeout() {
        let metastore = Arc::new(FaultyMetastore::default());
        let src = p("s3://b/d/part-0");
        let dst = p("s3://b/d/final-0");
        metastore.add(&src, false).await.unwrap();
        metastore.fail_with_timeout("add");

        // Reported, then the rename goes ahead
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let e = engine_with(enabled_config(), metastore.clone(), dispatcher.clone());
        let store = ScriptedStore::new();
        store.put_file(&src, 1);
        assert!(rename(&e, &store, &src, &dst).await.unwrap());
        assert_eq!(store.rename_calls.load(Ordering::SeqCst), 1);
        assert!(store.contains(&dst));
        assert_eq!(dispatcher.timeouts(), vec![("rename".to_string(), vec![src.clone()])]);

        // Reported and surfaced before the store is touched
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let mut config = enabled_config();
        config.fail_on_timeout = true;
        let e = engine_with(config, metastore.clone(), dispatcher.clone());
        let store = ScriptedStore::new();
        store.put_file(&src, 1);
        let err = rename(&e, &store, &src, &dst).await.unwrap_err();
        assert!(matches!(
            err,
            ConsistencyError::Timeout { operation: "rename", .. }
        ));
        assert_eq!(store.rename_calls.load(Ordering::SeqCst), 0);
        assert!(store.contains(&src));
        assert_eq!(dispatcher.timeouts(), vec![("rename".to_string(), vec![src])]);
    }

    #[tokio::test]
    async fn test_rename_cleanup_timeout_swallowed() {
        let metastore = Arc::new(FaultyMetastore::default());
        let src = p("s3://b/d/part-0");
        let dst = p("s3://b/d/final-0");
        metastore.add(&src, false).await.unwrap();
        metastore.fail_with_timeout("delete_all");

        let dispatcher = Arc::new(RecordingDispatcher::default());
        let e = engine_with(enabled_config(), metastore.clone(), dispatcher.clone());
        let store = ScriptedStore::new();
        store.put_file(&src, 1);
        assert!(rename(&e, &store, &src, &dst).await.unwrap());
        assert!(store.contains(&dst));
        assert_eq!(dispatcher.timeouts(), vec![("rename_cleanup".to_string(), vec![src])]);
    }
}
