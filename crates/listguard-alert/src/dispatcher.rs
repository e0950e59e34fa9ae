//! Alert dispatcher contract and chaining

use listguard_common::StorePath;
use std::sync::Arc;

/// Receiver of consistency incidents
///
/// Dispatchers are fire-and-forget: they never fail and never block the
/// engine for longer than it takes to hand the event off.
pub trait AlertDispatcher: Send + Sync {
    /// Dispatcher name, as registered in the factory
    fn name(&self) -> &str;

    /// A check failed, or proceeded, with paths still missing
    fn alert(&self, missing: &[StorePath]);

    /// A metastore call exceeded its timeout
    fn timeout(&self, operation: &str, paths: &[StorePath]);

    /// A listing became consistent after one or more retries
    fn recovered(&self, paths: &[StorePath]);
}

/// Dispatcher that discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDispatcher;

impl AlertDispatcher for NoopDispatcher {
    fn name(&self) -> &str {
        "noop"
    }

    fn alert(&self, _missing: &[StorePath]) {}

    fn timeout(&self, _operation: &str, _paths: &[StorePath]) {}

    fn recovered(&self, _paths: &[StorePath]) {}
}

/// Chain of dispatchers (every dispatcher sees every event, in order)
#[derive(Default)]
pub struct DispatcherChain {
    dispatchers: Vec<Arc<dyn AlertDispatcher>>,
}

impl DispatcherChain {
    /// Create a new empty chain
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dispatcher to the chain
    pub fn add_arc(&mut self, dispatcher: Arc<dyn AlertDispatcher>) -> &mut Self {
        self.dispatchers.push(dispatcher);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dispatchers.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.dispatchers.len()
    }
}

impl AlertDispatcher for DispatcherChain {
    fn name(&self) -> &str {
        "chain"
    }

    fn alert(&self, missing: &[StorePath]) {
        for dispatcher in &self.dispatchers {
            dispatcher.alert(missing);
        }
    }

    fn timeout(&self, operation: &str, paths: &[StorePath]) {
        for dispatcher in &self.dispatchers {
            dispatcher.timeout(operation, paths);
        }
    }

    fn recovered(&self, paths: &[StorePath]) {
        for dispatcher in &self.dispatchers {
            dispatcher.recovered(paths);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        alerts: AtomicUsize,
        timeouts: AtomicUsize,
        recoveries: AtomicUsize,
    }

    impl AlertDispatcher for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn alert(&self, _missing: &[StorePath]) {
            self.alerts.fetch_add(1, Ordering::Relaxed);
        }

        fn timeout(&self, _operation: &str, _paths: &[StorePath]) {
            self.timeouts.fetch_add(1, Ordering::Relaxed);
        }

        fn recovered(&self, _paths: &[StorePath]) {
            self.recoveries.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_chain_fans_out() {
        let first = Arc::new(Counting::default());
        let second = Arc::new(Counting::default());
        let mut chain = DispatcherChain::new();
        chain
            .add_arc(first.clone())
            .add_arc(Arc::new(NoopDispatcher))
            .add_arc(second.clone());
        assert_eq!(chain.len(), 3);

        let paths = vec![StorePath::parse("s3://b/x").unwrap()];
        chain.alert(&paths);
        chain.timeout("list", &paths);
        chain.recovered(&paths);
        chain.recovered(&paths);

        for counting in [&first, &second] {
            assert_eq!(counting.alerts.load(Ordering::Relaxed), 1);
            assert_eq!(counting.timeouts.load(Ordering::Relaxed), 1);
            assert_eq!(counting.recoveries.load(Ordering::Relaxed), 2);
        }
    }
}
