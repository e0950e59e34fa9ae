//! Dispatcher factory
//!
//! Resolves the configured dispatcher name to an instance. A comma-separated
//! list (`log,metrics`) builds a [`DispatcherChain`].

use crate::dispatcher::{AlertDispatcher, DispatcherChain, NoopDispatcher};
use crate::log::LoggingDispatcher;
use crate::metrics::MetricsDispatcher;
use listguard_common::MetricsRegistry;
use std::collections::HashMap;
use std::sync::Arc;

/// Error type for dispatcher resolution
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("unknown dispatcher implementation '{0}'")]
    UnknownImplementation(String),
    #[error("no dispatcher configured")]
    Empty,
}

/// Constructor for a dispatcher; receives the layer's metrics registry
pub type DispatcherConstructor =
    Arc<dyn Fn(&Arc<MetricsRegistry>) -> Arc<dyn AlertDispatcher> + Send + Sync>;

/// Registry of dispatchers keyed by name
#[derive(Clone)]
pub struct DispatcherFactory {
    constructors: HashMap<String, DispatcherConstructor>,
}

impl DispatcherFactory {
    /// Factory with `log`, `metrics` and `noop` registered
    #[must_use]
    pub fn new() -> Self {
        let mut factory = Self {
            constructors: HashMap::new(),
        };
        factory.register(
            "log",
            Arc::new(|_: &Arc<MetricsRegistry>| {
                Arc::new(LoggingDispatcher::new()) as Arc<dyn AlertDispatcher>
            }),
        );
        factory.register(
            "metrics",
            Arc::new(|metrics: &Arc<MetricsRegistry>| {
                Arc::new(MetricsDispatcher::new(metrics.clone())) as Arc<dyn AlertDispatcher>
            }),
        );
        factory.register(
            "noop",
            Arc::new(|_: &Arc<MetricsRegistry>| {
                Arc::new(NoopDispatcher) as Arc<dyn AlertDispatcher>
            }),
        );
        factory
    }

    /// Register (or replace) a dispatcher; names are case-insensitive
    pub fn register(&mut self, name: &str, constructor: DispatcherConstructor) {
        self.constructors.insert(name.to_lowercase(), constructor);
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build the dispatcher(s) named by `spec`
    pub fn create(
        &self,
        spec: &str,
        metrics: &Arc<MetricsRegistry>,
    ) -> Result<Arc<dyn AlertDispatcher>, AlertError> {
        let mut built = Vec::new();
        for name in spec.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let constructor = self
                .constructors
                .get(&name.to_lowercase())
                .ok_or_else(|| AlertError::UnknownImplementation(name.to_string()))?;
            built.push(constructor(metrics));
        }

        match built.len() {
            0 => Err(AlertError::Empty),
            1 => Ok(built.remove(0)),
            _ => {
                let mut chain = DispatcherChain::new();
                for dispatcher in built {
                    chain.add_arc(dispatcher);
                }
                Ok(Arc::new(chain))
            }
        }
    }
}

impl Default for DispatcherFactory {
    fn default() -> Self {
        Self::new()
    }
}
