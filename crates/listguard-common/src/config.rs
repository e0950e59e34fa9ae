//! Configuration types for Listguard
//!
//! Configuration arrives as flat `listguard.*` key/value [`Properties`]
//! (built from pairs or a TOML document) and is resolved into an immutable
//! [`ConsistencyConfig`] snapshot on every hooked call.

use crate::error::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Configuration keys
pub mod keys {
    pub const DISABLE: &str = "listguard.disable";
    pub const DARKLOAD: &str = "listguard.darkload";
    pub const FAIL_ON_ERROR: &str = "listguard.failOnError";
    pub const TASK_FAIL_ON_ERROR: &str = "listguard.task.failOnError";
    pub const FAIL_ON_TIMEOUT: &str = "listguard.failOnTimeout";
    pub const TRACK_DIRECTORIES: &str = "listguard.listing.directory.tracking";
    pub const CHECK_TASK_LISTINGS: &str = "listguard.listing.task.check";
    pub const DELIST_DELETED: &str = "listguard.listing.delist.deleted";
    pub const THRESHOLD: &str = "listguard.listing.threshold";
    pub const RECHECK_COUNT: &str = "listguard.listing.recheck.count";
    pub const RECHECK_PERIOD: &str = "listguard.listing.recheck.period";
    pub const TASK_RECHECK_COUNT: &str = "listguard.listing.task.recheck.count";
    pub const TASK_RECHECK_PERIOD: &str = "listguard.listing.task.recheck.period";
    pub const STAT_ON_MISSING_FILE: &str = "listguard.listing.statOnMissingFile";
    pub const MONITORING_HOST: &str = "listguard.monitoring.host";
    pub const MONITORING_PORT: &str = "listguard.monitoring.port";
    pub const MONITORING_CONCURRENCY: &str = "listguard.monitoring.concurrency";
    pub const MONITORING_HIGH_WATER_MARK: &str = "listguard.monitoring.highwatermark";
    pub const METASTORE_IMPL: &str = "listguard.metastore.impl";
    pub const METASTORE_PATH: &str = "listguard.metastore.path";
    pub const METASTORE_TIMEOUT: &str = "listguard.metastore.timeout";
    pub const METASTORE_DELETE_MARKERS: &str = "listguard.metastore.deleteMarker.enabled";
    pub const DISPATCHER_IMPL: &str = "listguard.dispatcher.impl";
}

/// Mutable key/value configuration source shared with the host
#[derive(Debug, Default)]
pub struct Properties {
    values: RwLock<HashMap<String, String>>,
}

impl Properties {
    /// Create an empty property set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from key/value pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            values: RwLock::new(values),
        }
    }

    /// Build from a TOML document; nested tables flatten to dotted keys
    pub fn from_toml_str(document: &str) -> Result<Self> {
        let table: toml::Table = document.parse()?;
        let mut values = HashMap::new();
        flatten_table("", &table, &mut values)?;
        Ok(Self {
            values: RwLock::new(values),
        })
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.write().insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.values.write().remove(key)
    }

    /// Copy of all current values
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.values.read().clone()
    }

    /// Merge `other` into this set; values in `other` win
    pub fn merge(&self, other: &Self) {
        let incoming = other.snapshot();
        self.values.write().extend(incoming);
    }
}

fn flatten_table(
    prefix: &str,
    table: &toml::Table,
    out: &mut HashMap<String, String>,
) -> Result<()> {
    for (name, value) in table {
        let key = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        match value {
            toml::Value::Table(nested) => flatten_table(&key, nested, out)?,
            toml::Value::String(s) => {
                out.insert(key, s.clone());
            }
            toml::Value::Integer(i) => {
                out.insert(key, i.to_string());
            }
            toml::Value::Float(f) => {
                out.insert(key, f.to_string());
            }
            toml::Value::Boolean(b) => {
                out.insert(key, b.to_string());
            }
            toml::Value::Datetime(d) => {
                out.insert(key, d.to_string());
            }
            toml::Value::Array(_) => {
                return Err(Error::configuration(format!(
                    "arrays are not supported for '{key}'"
                )));
            }
        }
    }
    Ok(())
}

/// Resolved configuration snapshot for one hooked call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    /// Bypass the engine entirely
    pub disabled: bool,
    /// Run checks but always return the raw listing
    pub darkload: bool,
    /// Surface non-timeout errors (driver context)
    pub fail_on_error: bool,
    /// Surface non-timeout errors (task context)
    pub task_fail_on_error: bool,
    /// Surface metastore timeouts
    pub fail_on_timeout: bool,
    /// Record directory creations as directories
    pub track_directories: bool,
    /// Reconcile listings issued from task context
    pub check_task_listings: bool,
    /// Strip tombstoned entries from raw listings
    pub delist_deleted: bool,
    /// Acceptable listed/expected ratio; values below 1 enable the escape valve
    pub file_threshold: f32,
    pub recheck_count: u32,
    pub recheck_period_ms: u64,
    pub task_recheck_count: u32,
    pub task_recheck_period_ms: u64,
    /// Probe the store for missing paths instead of retrying
    pub stat_on_missing_file: bool,
    /// Present when a monitoring endpoint is configured
    pub monitoring: Option<MonitoringSettings>,
    pub metastore: MetastoreSettings,
    pub dispatcher: DispatcherSettings,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            disabled: true,
            darkload: false,
            fail_on_error: false,
            task_fail_on_error: false,
            fail_on_timeout: false,
            track_directories: false,
            check_task_listings: false,
            delist_deleted: true,
            file_threshold: 1.0,
            recheck_count: 15,
            recheck_period_ms: 60_000,
            task_recheck_count: 0,
            task_recheck_period_ms: 60_000,
            stat_on_missing_file: false,
            monitoring: None,
            metastore: MetastoreSettings::default(),
            dispatcher: DispatcherSettings::default(),
        }
    }
}

impl ConsistencyConfig {
    /// Resolve a snapshot from properties
    ///
    /// When the engine is disabled the remaining keys are not consulted, so a
    /// disabled layer never fails on unrelated configuration.
    pub fn from_properties(props: &Properties) -> Result<Self> {
        let values = props.values.read();
        let defaults = Self::default();

        let disabled = read(&values, keys::DISABLE, defaults.disabled)?;
        if disabled {
            return Ok(defaults);
        }

        let monitoring = match values.get(keys::MONITORING_HOST) {
            Some(host) => {
                let base = MonitoringSettings::default();
                Some(MonitoringSettings {
                    host: host.clone(),
                    port: read(&values, keys::MONITORING_PORT, base.port)?,
                    concurrency: read(&values, keys::MONITORING_CONCURRENCY, base.concurrency)?,
                    high_water_mark: read(
                        &values,
                        keys::MONITORING_HIGH_WATER_MARK,
                        base.high_water_mark,
                    )?,
                })
            }
            None => None,
        };

        let metastore = MetastoreSettings::read_from(&values)?;

        let config = Self {
            disabled,
            darkload: read(&values, keys::DARKLOAD, defaults.darkload)?,
            fail_on_error: read(&values, keys::FAIL_ON_ERROR, defaults.fail_on_error)?,
            task_fail_on_error: read(
                &values,
                keys::TASK_FAIL_ON_ERROR,
                defaults.task_fail_on_error,
            )?,
            fail_on_timeout: read(&values, keys::FAIL_ON_TIMEOUT, defaults.fail_on_timeout)?,
            track_directories: read(&values, keys::TRACK_DIRECTORIES, defaults.track_directories)?,
            check_task_listings: read(
                &values,
                keys::CHECK_TASK_LISTINGS,
                defaults.check_task_listings,
            )?,
            delist_deleted: read(&values, keys::DELIST_DELETED, defaults.delist_deleted)?,
            file_threshold: read(&values, keys::THRESHOLD, defaults.file_threshold)?,
            recheck_count: read(&values, keys::RECHECK_COUNT, defaults.recheck_count)?,
            recheck_period_ms: read(&values, keys::RECHECK_PERIOD, defaults.recheck_period_ms)?,
            task_recheck_count: read(
                &values,
                keys::TASK_RECHECK_COUNT,
                defaults.task_recheck_count,
            )?,
            task_recheck_period_ms: read(
                &values,
                keys::TASK_RECHECK_PERIOD,
                defaults.task_recheck_period_ms,
            )?,
            stat_on_missing_file: read(
                &values,
                keys::STAT_ON_MISSING_FILE,
                defaults.stat_on_missing_file,
            )?,
            monitoring,
            metastore,
            dispatcher: DispatcherSettings {
                implementation: read(
                    &values,
                    keys::DISPATCHER_IMPL,
                    defaults.dispatcher.implementation,
                )?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !self.file_threshold.is_finite() || self.file_threshold < 0.0 {
            return Err(Error::InvalidValue {
                key: keys::THRESHOLD.to_string(),
                value: self.file_threshold.to_string(),
            });
        }
        if self.metastore.timeout_ms == 0 {
            return Err(Error::InvalidValue {
                key: keys::METASTORE_TIMEOUT.to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Whether monitoring decorators should be installed
    #[must_use]
    pub const fn is_monitoring(&self) -> bool {
        self.monitoring.is_some()
    }

    #[must_use]
    pub const fn recheck_period(&self) -> Duration {
        Duration::from_millis(self.recheck_period_ms)
    }

    #[must_use]
    pub const fn task_recheck_period(&self) -> Duration {
        Duration::from_millis(self.task_recheck_period_ms)
    }
}

fn read<T: FromStr>(values: &HashMap<String, String>, key: &str, default: T) -> Result<T> {
    match values.get(key) {
        Some(raw) => raw.trim().parse().map_err(|_| Error::InvalidValue {
            key: key.to_string(),
            value: raw.clone(),
        }),
        None => Ok(default),
    }
}

/// Monitoring endpoint settings
///
/// Setting a host turns on in-process metrics. The port and submission
/// limits are carried for an external exporter that scrapes the registry.
/// The layer itself does not read them; `listguard-admin config` prints
/// them with the rest of the resolved configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringSettings {
    pub host: String,
    pub port: u16,
    /// Maximum concurrent metric submissions
    pub concurrency: usize,
    /// Maximum buffered metric events
    pub high_water_mark: usize,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25652,
            concurrency: 5,
            high_water_mark: 1000,
        }
    }
}

/// Metastore backend settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetastoreSettings {
    /// Backend name resolved by the metastore factory
    pub implementation: String,
    /// Backend-specific location (database file for redb)
    pub location: String,
    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,
    /// Tombstone records on delete instead of removing them
    pub delete_markers: bool,
}

impl Default for MetastoreSettings {
    fn default() -> Self {
        Self {
            implementation: "redb".to_string(),
            location: "/var/lib/listguard/metastore.redb".to_string(),
            timeout_ms: 5000,
            delete_markers: false,
        }
    }
}

impl MetastoreSettings {
    /// Resolve backend settings regardless of whether the engine is enabled
    pub fn from_properties(props: &Properties) -> Result<Self> {
        Self::read_from(&props.values.read())
    }

    fn read_from(values: &HashMap<String, String>) -> Result<Self> {
        let base = Self::default();
        let settings = Self {
            implementation: read(values, keys::METASTORE_IMPL, base.implementation)?,
            location: read(values, keys::METASTORE_PATH, base.location)?,
            timeout_ms: read(values, keys::METASTORE_TIMEOUT, base.timeout_ms)?,
            delete_markers: read(values, keys::METASTORE_DELETE_MARKERS, base.delete_markers)?,
        };
        if settings.timeout_ms == 0 {
            return Err(Error::InvalidValue {
                key: keys::METASTORE_TIMEOUT.to_string(),
                value: "0".to_string(),
            });
        }
        Ok(settings)
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Alert dispatcher settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherSettings {
    /// Dispatcher name resolved by the dispatcher factory
    pub implementation: String,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            implementation: "log".to_string(),
        }
    }
}
