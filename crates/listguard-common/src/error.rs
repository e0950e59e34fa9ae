//! Error types for Listguard
//!
//! This module defines the common error type shared by the path model and
//! the configuration layer.

use thiserror::Error;

/// Common result type for Listguard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Listguard
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid value for '{key}': {value}")]
    InvalidValue { key: String, value: String },

    #[error("config file error: {0}")]
    ConfigFile(#[from] toml::de::Error),
}

impl Error {
    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if this error came from configuration resolution
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::InvalidValue { .. } | Self::ConfigFile(_)
        )
    }
}
