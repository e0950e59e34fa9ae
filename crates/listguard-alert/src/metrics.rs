//! Dispatcher that feeds incidents into the metrics registry

use crate::dispatcher::AlertDispatcher;
use listguard_common::{MetricsRegistry, StorePath};
use std::sync::Arc;

pub const ALERTS: &str = "alerts";
pub const RECOVERIES: &str = "recoveries";
pub const TIMEOUTS: &str = "timeouts";
pub const MISSING_PATHS: &str = "missing_paths";
pub const RECOVERED_PATHS: &str = "recovered_paths";

/// Counts incidents and records how many paths each one touched
pub struct MetricsDispatcher {
    metrics: Arc<MetricsRegistry>,
}

impl MetricsDispatcher {
    pub fn new(metrics: Arc<MetricsRegistry>) -> Self {
        Self { metrics }
    }
}

fn path_count(paths: &[StorePath]) -> u64 {
    u64::try_from(paths.len()).unwrap_or(u64::MAX)
}

impl AlertDispatcher for MetricsDispatcher {
    fn name(&self) -> &str {
        "metrics"
    }

    fn alert(&self, missing: &[StorePath]) {
        self.metrics.increment(ALERTS, "missing");
        self.metrics.observe(MISSING_PATHS, path_count(missing));
    }

    fn timeout(&self, operation: &str, _paths: &[StorePath]) {
        self.metrics.increment(TIMEOUTS, operation);
    }

    fn recovered(&self, paths: &[StorePath]) {
        self.metrics.increment(RECOVERIES, "listing");
        self.metrics.observe(RECOVERED_PATHS, path_count(paths));
    }
}
