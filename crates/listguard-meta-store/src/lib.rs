//! Listguard Metadata Store - strongly-consistent path index
//!
//! This crate defines the [`Metastore`] contract consulted by the consistency
//! engine, an in-memory and a redb-backed implementation, a monitoring
//! decorator and the factory that selects a backend by name.

pub mod error;
pub mod factory;
pub mod memory;
pub mod metastore;
pub mod monitoring;
pub mod store;
mod tables;

// Re-exports
pub use error::{MetaStoreError, MetaStoreResult};
pub use factory::{MetastoreConstructor, MetastoreFactory};
pub use memory::InMemoryMetastore;
pub use metastore::{Metastore, cutoff_before, with_timeout};
pub use monitoring::MonitoringMetastore;
pub use store::RedbMetastore;
