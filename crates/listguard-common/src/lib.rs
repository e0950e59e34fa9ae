//! Listguard Common - Shared types and utilities
//!
//! This crate provides the path model, metadata records, configuration
//! snapshot, metrics registry and error definitions used across all
//! Listguard components.

pub mod config;
pub mod error;
pub mod metrics;
pub mod path;
pub mod types;

pub use config::{
    ConsistencyConfig, DispatcherSettings, MetastoreSettings, MonitoringSettings, Properties,
};
pub use error::{Error, Result};
pub use metrics::MetricsRegistry;
pub use path::StorePath;
pub use types::*;
