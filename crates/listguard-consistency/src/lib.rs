//! Listguard Consistency - listing reconciliation for eventually-consistent stores
//!
//! The [`ConsistencyEngine`] records every path written through it in a
//! strongly-consistent metastore and, on listing, compares the store's answer
//! against those records, retrying until the listing catches up or the
//! recheck budget runs out. Renames and deletes are propagated to the
//! metastore so it never claims paths that are gone.
//!
//! Hosts wrap their store client in a [`ConsistentStore`], which implements
//! the same [`ObjectStore`] trait and consults a shared [`ConsistencyLayer`]
//! on every call.

mod delete;
pub mod engine;
pub mod error;
pub mod layer;
pub mod monitoring;
pub mod recheck;
pub mod rename;
pub mod store;

#[cfg(test)]
mod testing;

// Re-exports
pub use engine::{ConsistencyEngine, RecheckBudget, delist, missing_paths, ops};
pub use error::{ConsistencyError, RenameRejection, StoreError, StoreResult};
pub use layer::{ConsistencyLayer, ConsistentStore};
pub use monitoring::{EngineHandle, MonitoredEngine};
pub use recheck::RecheckScheduler;
pub use rename::RenameInfo;
pub use store::ObjectStore;
