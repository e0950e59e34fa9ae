//! Error type for metastore operations

use std::time::Duration;

/// Error type for metastore operations
#[derive(Debug, thiserror::Error)]
pub enum MetaStoreError {
    #[error("metastore {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("metastore is not initialized")]
    NotInitialized,
    #[error("metastore is closed")]
    Closed,
    #[error("unknown metastore implementation '{0}'")]
    UnknownImplementation(String),
    #[error("metastore backend error: {0}")]
    Backend(String),
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<redb::TransactionError> for MetaStoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl MetaStoreError {
    /// Create a backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Short label used for metrics and logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::NotInitialized => "not_initialized",
            Self::Closed => "closed",
            Self::UnknownImplementation(_) => "unknown_implementation",
            Self::Backend(_) => "backend",
            Self::Redb(_)
            | Self::Storage(_)
            | Self::Table(_)
            | Self::Transaction(_)
            | Self::Commit(_) => "redb",
            Self::Bincode(_) => "codec",
            Self::Io(_) => "io",
            Self::Join(_) => "join",
        }
    }
}

pub type MetaStoreResult<T> = Result<T, MetaStoreError>;
