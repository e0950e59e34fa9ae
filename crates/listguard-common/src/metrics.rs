//! Metrics registry for Prometheus
//!
//! Tracks per-operation outcomes and latencies for the engine, the proceed
//! callbacks and the metastore, plus named event counters and value
//! histograms fed by the alert dispatchers.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Latency bucket upper bounds in milliseconds
const LATENCY_BUCKET_BOUNDARIES_MS: [u64; 11] =
    [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

/// Value histogram upper bounds (path counts)
const VALUE_BUCKET_BOUNDARIES: [u64; 10] = [1, 2, 5, 10, 25, 50, 100, 250, 500, 1000];

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct OperationKey {
    scope: String,
    operation: String,
}

/// Per-operation metrics
#[derive(Debug, Default)]
struct OperationMetrics {
    success: AtomicU64,
    /// Failures keyed by error kind
    failures: RwLock<HashMap<String, AtomicU64>>,
    latency_sum_us: AtomicU64,
    latency_count: AtomicU64,
    /// Non-cumulative bucket counts; the last slot is +Inf
    latency_buckets: [AtomicU64; 12],
}

impl OperationMetrics {
    fn record_latency(&self, latency_us: u64) {
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
        let latency_ms = latency_us / 1000;
        let slot = LATENCY_BUCKET_BOUNDARIES_MS
            .iter()
            .position(|&boundary| latency_ms <= boundary)
            .unwrap_or(LATENCY_BUCKET_BOUNDARIES_MS.len());
        self.latency_buckets[slot].fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self, kind: &str) {
        if let Some(counter) = self.failures.read().get(kind) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.failures
            .write()
            .entry(kind.to_string())
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }
}

/// Distribution of observed values
#[derive(Debug, Default)]
struct ValueHistogram {
    sum: AtomicU64,
    count: AtomicU64,
    buckets: [AtomicU64; 11],
}

impl ValueHistogram {
    fn observe(&self, value: u64) {
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        let slot = VALUE_BUCKET_BOUNDARIES
            .iter()
            .position(|&boundary| value <= boundary)
            .unwrap_or(VALUE_BUCKET_BOUNDARIES.len());
        self.buckets[slot].fetch_add(1, Ordering::Relaxed);
    }
}

/// Shared metrics collector
#[derive(Debug)]
pub struct MetricsRegistry {
    operations: RwLock<HashMap<OperationKey, OperationMetrics>>,
    /// Event counters keyed by (name, label)
    counters: RwLock<HashMap<(String, String), AtomicU64>>,
    histograms: RwLock<HashMap<String, ValueHistogram>>,
    start_time: Instant,
}

impl MetricsRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            operations: RwLock::new(HashMap::new()),
            counters: RwLock::new(HashMap::new()),
            histograms: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    fn with_operation(&self, scope: &str, operation: &str, f: impl FnOnce(&OperationMetrics)) {
        let key = OperationKey {
            scope: scope.to_string(),
            operation: operation.to_string(),
        };
        if let Some(metrics) = self.operations.read().get(&key) {
            f(metrics);
            return;
        }
        let mut ops = self.operations.write();
        f(ops.entry(key).or_default());
    }

    /// Record a successful call
    pub fn record_success(&self, scope: &str, operation: &str, latency_us: u64) {
        self.with_operation(scope, operation, |metrics| {
            metrics.success.fetch_add(1, Ordering::Relaxed);
            metrics.record_latency(latency_us);
        });
    }

    /// Record a failed call labelled by error kind
    pub fn record_failure(&self, scope: &str, operation: &str, kind: &str, latency_us: u64) {
        self.with_operation(scope, operation, |metrics| {
            metrics.record_failure(kind);
            metrics.record_latency(latency_us);
        });
    }

    /// Increment a named event counter
    pub fn increment(&self, name: &str, label: &str) {
        let key = (name.to_string(), label.to_string());
        if let Some(counter) = self.counters.read().get(&key) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.counters
            .write()
            .entry(key)
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Observe one value in a named histogram
    pub fn observe(&self, name: &str, value: u64) {
        if let Some(histogram) = self.histograms.read().get(name) {
            histogram.observe(value);
            return;
        }
        self.histograms
            .write()
            .entry(name.to_string())
            .or_default()
            .observe(value);
    }

    /// Successful calls recorded for an operation
    #[must_use]
    pub fn success_count(&self, scope: &str, operation: &str) -> u64 {
        let key = OperationKey {
            scope: scope.to_string(),
            operation: operation.to_string(),
        };
        self.operations
            .read()
            .get(&key)
            .map_or(0, |m| m.success.load(Ordering::Relaxed))
    }

    /// Failed calls recorded for an operation, across all kinds
    #[must_use]
    pub fn failure_count(&self, scope: &str, operation: &str) -> u64 {
        let key = OperationKey {
            scope: scope.to_string(),
            operation: operation.to_string(),
        };
        self.operations.read().get(&key).map_or(0, |m| {
            m.failures
                .read()
                .values()
                .map(|c| c.load(Ordering::Relaxed))
                .sum()
        })
    }

    /// Current value of a named counter
    #[must_use]
    pub fn counter(&self, name: &str, label: &str) -> u64 {
        self.counters
            .read()
            .get(&(name.to_string(), label.to_string()))
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Number of observations in a named histogram
    #[must_use]
    pub fn observation_count(&self, name: &str) -> u64 {
        self.histograms
            .read()
            .get(name)
            .map_or(0, |h| h.count.load(Ordering::Relaxed))
    }

    /// Export metrics in Prometheus format
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn export_prometheus(&self) -> String {
        let mut output = String::with_capacity(4 * 1024);

        let _ = writeln!(
            output,
            "# HELP listguard_uptime_seconds Time since the registry was created"
        );
        let _ = writeln!(output, "# TYPE listguard_uptime_seconds counter");
        let _ = writeln!(
            output,
            "listguard_uptime_seconds {}",
            self.start_time.elapsed().as_secs()
        );

        let ops = self.operations.read();
        let mut keys: Vec<&OperationKey> = ops.keys().collect();
        keys.sort();

        if !keys.is_empty() {
            let _ = writeln!(
                output,
                "# HELP listguard_operations_total Calls by scope, operation and result"
            );
            let _ = writeln!(output, "# TYPE listguard_operations_total counter");
            for key in &keys {
                let metrics = &ops[*key];
                let _ = writeln!(
                    output,
                    "listguard_operations_total{{scope=\"{}\",operation=\"{}\",result=\"ok\"}} {}",
                    key.scope,
                    key.operation,
                    metrics.success.load(Ordering::Relaxed)
                );
                let failures = metrics.failures.read();
                let mut kinds: Vec<&String> = failures.keys().collect();
                kinds.sort();
                for kind in kinds {
                    let _ = writeln!(
                        output,
                        "listguard_operations_total{{scope=\"{}\",operation=\"{}\",result=\"error\",kind=\"{}\"}} {}",
                        key.scope,
                        key.operation,
                        kind,
                        failures[kind].load(Ordering::Relaxed)
                    );
                }
            }

            let _ = writeln!(
                output,
                "# HELP listguard_operation_duration_seconds Call duration histogram"
            );
            let _ = writeln!(
                output,
                "# TYPE listguard_operation_duration_seconds histogram"
            );
            for key in &keys {
                let metrics = &ops[*key];
                let mut cumulative = 0u64;
                for (i, &boundary_ms) in LATENCY_BUCKET_BOUNDARIES_MS.iter().enumerate() {
                    cumulative += metrics.latency_buckets[i].load(Ordering::Relaxed);
                    let _ = writeln!(
                        output,
                        "listguard_operation_duration_seconds_bucket{{scope=\"{}\",operation=\"{}\",le=\"{}\"}} {}",
                        key.scope,
                        key.operation,
                        boundary_ms as f64 / 1000.0,
                        cumulative
                    );
                }
                let total = metrics.latency_count.load(Ordering::Relaxed);
                let _ = writeln!(
                    output,
                    "listguard_operation_duration_seconds_bucket{{scope=\"{}\",operation=\"{}\",le=\"+Inf\"}} {}",
                    key.scope, key.operation, total
                );
                let _ = writeln!(
                    output,
                    "listguard_operation_duration_seconds_sum{{scope=\"{}\",operation=\"{}\"}} {}",
                    key.scope,
                    key.operation,
                    metrics.latency_sum_us.load(Ordering::Relaxed) as f64 / 1_000_000.0
                );
                let _ = writeln!(
                    output,
                    "listguard_operation_duration_seconds_count{{scope=\"{}\",operation=\"{}\"}} {}",
                    key.scope, key.operation, total
                );
            }
        }
        drop(ops);

        let counters = self.counters.read();
        let mut counter_keys: Vec<&(String, String)> = counters.keys().collect();
        counter_keys.sort();
        let mut last_name: Option<&str> = None;
        for key in counter_keys {
            let (name, label) = key;
            if last_name != Some(name.as_str()) {
                let _ = writeln!(output, "# TYPE listguard_{name}_total counter");
                last_name = Some(name.as_str());
            }
            let _ = writeln!(
                output,
                "listguard_{name}_total{{label=\"{label}\"}} {}",
                counters[key].load(Ordering::Relaxed)
            );
        }
        drop(counters);

        let histograms = self.histograms.read();
        let mut names: Vec<&String> = histograms.keys().collect();
        names.sort();
        for name in names {
            let histogram = &histograms[name];
            let _ = writeln!(output, "# TYPE listguard_{name} histogram");
            let mut cumulative = 0u64;
            for (i, boundary) in VALUE_BUCKET_BOUNDARIES.iter().enumerate() {
                cumulative += histogram.buckets[i].load(Ordering::Relaxed);
                let _ = writeln!(
                    output,
                    "listguard_{name}_bucket{{le=\"{boundary}\"}} {cumulative}"
                );
            }
            let count = histogram.count.load(Ordering::Relaxed);
            let _ = writeln!(output, "listguard_{name}_bucket{{le=\"+Inf\"}} {count}");
            let _ = writeln!(
                output,
                "listguard_{name}_sum {}",
                histogram.sum.load(Ordering::Relaxed)
            );
            let _ = writeln!(output, "listguard_{name}_count {count}");
        }

        output
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Timer for one monitored call
#[derive(Debug)]
pub struct OperationTimer {
    start: Instant,
}

impl OperationTimer {
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed time in microseconds, saturating
    #[must_use]
    pub fn elapsed_us(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}
