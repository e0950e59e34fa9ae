//! Metastore factory
//!
//! Resolves the configured implementation name to a constructed backend.
//! `memory` and `redb` are built in; hosts may register their own
//! constructors under additional names.

use crate::error::{MetaStoreError, MetaStoreResult};
use crate::memory::InMemoryMetastore;
use crate::metastore::Metastore;
use crate::store::RedbMetastore;
use listguard_common::MetastoreSettings;
use std::collections::HashMap;
use std::sync::Arc;

/// Constructor for a metastore backend
pub type MetastoreConstructor =
    Arc<dyn Fn(&MetastoreSettings) -> MetaStoreResult<Arc<dyn Metastore>> + Send + Sync>;

/// Registry of metastore backends keyed by implementation name
#[derive(Clone)]
pub struct MetastoreFactory {
    constructors: HashMap<String, MetastoreConstructor>,
}

impl MetastoreFactory {
    /// Factory with the built-in backends registered
    #[must_use]
    pub fn new() -> Self {
        let mut factory = Self {
            constructors: HashMap::new(),
        };
        factory.register(
            "memory",
            Arc::new(|settings: &MetastoreSettings| {
                Ok(Arc::new(InMemoryMetastore::new(
                    settings.delete_markers,
                    settings.timeout(),
                )) as Arc<dyn Metastore>)
            }),
        );
        factory.register(
            "redb",
            Arc::new(|settings: &MetastoreSettings| {
                Ok(Arc::new(RedbMetastore::new(
                    settings.delete_markers,
                    settings.timeout(),
                )) as Arc<dyn Metastore>)
            }),
        );
        factory
    }

    /// Register (or replace) a backend; names are case-insensitive
    pub fn register(&mut self, name: &str, constructor: MetastoreConstructor) {
        self.constructors.insert(name.to_lowercase(), constructor);
    }

    /// Registered implementation names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Construct the backend named in `settings`
    ///
    /// The returned store still needs [`Metastore::initialize`].
    pub fn create(&self, settings: &MetastoreSettings) -> MetaStoreResult<Arc<dyn Metastore>> {
        let name = settings.implementation.to_lowercase();
        let constructor = self
            .constructors
            .get(&name)
            .ok_or_else(|| MetaStoreError::UnknownImplementation(settings.implementation.clone()))?;
        constructor(settings)
    }
}

impl Default for MetastoreFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetastoreFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetastoreFactory")
            .field("names", &self.names())
            .finish()
    }
}
