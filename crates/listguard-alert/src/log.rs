//! Dispatcher that reports incidents as tracing events

use crate::dispatcher::AlertDispatcher;
use listguard_common::StorePath;
use tracing::{info, warn};

/// Paths rendered per event before the rest are summarized
const MAX_LOGGED_PATHS: usize = 10;

/// Default dispatcher: one structured log event per incident
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDispatcher;

impl LoggingDispatcher {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Render at most [`MAX_LOGGED_PATHS`] paths
pub(crate) fn summarize(paths: &[StorePath]) -> String {
    let mut rendered: Vec<String> = paths
        .iter()
        .take(MAX_LOGGED_PATHS)
        .map(ToString::to_string)
        .collect();
    if paths.len() > MAX_LOGGED_PATHS {
        rendered.push(format!("... {} more", paths.len() - MAX_LOGGED_PATHS));
    }
    rendered.join(", ")
}

impl AlertDispatcher for LoggingDispatcher {
    fn name(&self) -> &str {
        "log"
    }

    fn alert(&self, missing: &[StorePath]) {
        warn!(
            missing = missing.len(),
            "Listing inconsistent with metastore: [{}]",
            summarize(missing)
        );
    }

    fn timeout(&self, operation: &str, paths: &[StorePath]) {
        warn!(
            operation,
            paths = paths.len(),
            "Metastore timeout: [{}]",
            summarize(paths)
        );
    }

    fn recovered(&self, paths: &[StorePath]) {
        info!(
            paths = paths.len(),
            "Listing recovered after recheck: [{}]",
            summarize(paths)
        );
    }
}
