//! Listguard Alert - consistency incident dispatchers
//!
//! The consistency engine reports missing paths, recoveries and metastore
//! timeouts through an [`AlertDispatcher`]. This crate provides the contract,
//! logging / metrics / no-op implementations and a name-keyed factory.

pub mod dispatcher;
pub mod factory;
pub mod log;
pub mod metrics;

pub use dispatcher::{AlertDispatcher, DispatcherChain, NoopDispatcher};
pub use factory::{AlertError, DispatcherConstructor, DispatcherFactory};
pub use log::LoggingDispatcher;
pub use metrics::MetricsDispatcher;
