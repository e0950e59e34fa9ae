//! Error types for the consistency engine and the object-store hook

use listguard_common::StorePath;
use listguard_meta_store::MetaStoreError;
use thiserror::Error;

/// Error raised by the real object store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(StorePath),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Backend(String),
    /// Raised by a consistency layer wrapping this store
    #[error(transparent)]
    Consistency(Box<ConsistencyError>),
}

impl StoreError {
    /// Create a backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Short label used for metrics
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Io(_) => "io",
            Self::Backend(_) => "backend",
            Self::Consistency(_) => "consistency",
        }
    }
}

impl From<ConsistencyError> for StoreError {
    fn from(e: ConsistencyError) -> Self {
        match e {
            ConsistencyError::Store(inner) => inner,
            other => Self::Consistency(Box::new(other)),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Precondition violated by a rename request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenameRejection {
    #[error("cannot rename root {0}")]
    Root(StorePath),
    #[error("source {0} does not exist")]
    SourceMissing(StorePath),
    #[error("parent of destination {0} does not exist")]
    DestinationParentMissing(StorePath),
    #[error("destination {0} is an existing file")]
    DestinationIsFile(StorePath),
}

/// Error returned by the consistency layer
#[derive(Debug, Error)]
pub enum ConsistencyError {
    /// A metastore call exceeded its timeout
    #[error("metastore {operation} timed out")]
    Timeout {
        operation: &'static str,
        #[source]
        source: MetaStoreError,
    },

    /// Retries exhausted with metastore paths still absent from the listing
    #[error("listing is missing {} metastore path(s): {}", .missing.len(), render(.missing))]
    Inconsistent { missing: Vec<StorePath> },

    #[error("rename rejected: {0}")]
    Rejected(#[from] RenameRejection),

    #[error("metastore {operation} failed: {source}")]
    Metastore {
        operation: &'static str,
        #[source]
        source: MetaStoreError,
    },

    /// The real store's own error, passed through untouched
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("recheck cancelled")]
    Cancelled,

    #[error("initialization failed: {0}")]
    Initialization(String),
}

fn render(paths: &[StorePath]) -> String {
    paths
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl ConsistencyError {
    /// Short label used for metrics
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Inconsistent { .. } => "inconsistent",
            Self::Rejected(_) => "rejected",
            Self::Metastore { .. } => "metastore",
            Self::Store(_) => "store",
            Self::Cancelled => "cancelled",
            Self::Initialization(_) => "initialization",
        }
    }

    /// Paths still missing, for [`ConsistencyError::Inconsistent`]
    #[must_use]
    pub fn missing_paths(&self) -> Option<&[StorePath]> {
        match self {
            Self::Inconsistent { missing } => Some(missing),
            _ => None,
        }
    }

    /// Error produced by the real store rather than by this layer
    #[must_use]
    pub const fn is_store_error(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}
