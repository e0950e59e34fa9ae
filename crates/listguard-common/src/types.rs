//! Core type definitions for Listguard
//!
//! Metadata records kept by the metastore, entries of a raw store listing,
//! and the invocation context that selects driver or task policies.

use crate::path::StorePath;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One metastore record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Tracked location
    pub path: StorePath,
    /// Whether the location is a directory
    pub is_directory: bool,
    /// Tombstone flag: the path was deleted but the record is retained
    pub deleted: bool,
    /// Last modification of this record (epoch millis)
    pub updated_at: i64,
}

impl FileInfo {
    /// Create a live record stamped with the current time
    #[must_use]
    pub fn new(path: StorePath, is_directory: bool) -> Self {
        Self {
            path,
            is_directory,
            deleted: false,
            updated_at: now_millis(),
        }
    }

    /// Mark this record as deleted
    #[must_use]
    pub fn into_tombstone(mut self) -> Self {
        self.deleted = true;
        self.updated_at = now_millis();
        self
    }

    /// Identity of this record
    #[must_use]
    pub fn key(&self) -> String {
        self.path.key()
    }
}

/// Current wall-clock time in epoch milliseconds
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// One entry of a raw store listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStatus {
    pub path: StorePath,
    pub is_dir: bool,
    /// Object length in bytes (0 for directories)
    pub len: u64,
    /// Last modification reported by the store (epoch millis)
    pub modified_at: i64,
}

impl FileStatus {
    /// Status for a file
    #[must_use]
    pub const fn file(path: StorePath, len: u64) -> Self {
        Self {
            path,
            is_dir: false,
            len,
            modified_at: 0,
        }
    }

    /// Status for a directory
    #[must_use]
    pub const fn directory(path: StorePath) -> Self {
        Self {
            path,
            is_dir: true,
            len: 0,
            modified_at: 0,
        }
    }

    /// Set the modification timestamp
    #[must_use]
    pub const fn with_modified_at(mut self, modified_at: i64) -> Self {
        self.modified_at = modified_at;
        self
    }
}

/// Flavor of a create operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CreateKind {
    /// Object creation (open for write)
    File,
    /// Directory creation (mkdirs)
    Directory,
}

/// Execution context of a hooked call
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum InvocationContext {
    /// Coordinating process
    #[default]
    Driver,
    /// Inside an executing task
    Task { task_id: String },
}

impl InvocationContext {
    /// Context for a task attempt
    pub fn task(task_id: impl Into<String>) -> Self {
        Self::Task {
            task_id: task_id.into(),
        }
    }

    #[must_use]
    pub const fn is_task(&self) -> bool {
        matches!(self, Self::Task { .. })
    }
}

impl fmt::Display for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driver => write!(f, "driver"),
            Self::Task { task_id } => write!(f, "task {task_id}"),
        }
    }
}
