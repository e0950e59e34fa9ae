//! Normalized store locations
//!
//! Every comparison between the remote listing and the metastore goes through
//! [`StorePath::key`], the scheme-specific part of a normalized location.
//! Normalization happens once at construction, so two spellings of the same
//! location (`s3://b/a//x/`, `s3://b/a/./x`) always produce the same key.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A normalized location in the object store
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StorePath {
    scheme: Option<String>,
    authority: Option<String>,
    /// Absolute path, `/` for the root
    path: String,
}

impl StorePath {
    /// Parse `scheme://authority/path` or an absolute `/path`
    pub fn parse(input: &str) -> Result<Self> {
        let (scheme, rest) = match input.find("://") {
            Some(idx) => {
                let scheme = &input[..idx];
                let valid = !scheme.is_empty()
                    && scheme
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
                if !valid {
                    return Err(Error::invalid_path(input, "invalid scheme"));
                }
                (Some(scheme.to_ascii_lowercase()), &input[idx + 3..])
            }
            None => (None, input),
        };

        let (authority, raw_path) = if scheme.is_some() {
            let (authority, raw_path) = rest.find('/').map_or((rest, "/"), |i| rest.split_at(i));
            if authority.is_empty() {
                return Err(Error::invalid_path(input, "missing authority"));
            }
            (Some(authority.to_string()), raw_path)
        } else {
            if !rest.starts_with('/') {
                return Err(Error::invalid_path(input, "path must be absolute"));
            }
            (None, rest)
        };

        Ok(Self {
            scheme,
            authority,
            path: normalize(raw_path),
        })
    }

    /// Root of an authority, e.g. `s3://bucket/`
    #[must_use]
    pub fn root(scheme: &str, authority: &str) -> Self {
        Self {
            scheme: Some(scheme.to_ascii_lowercase()),
            authority: Some(authority.to_string()),
            path: "/".to_string(),
        }
    }

    /// Scheme-specific part used as the identity of this location
    #[must_use]
    pub fn key(&self) -> String {
        match (&self.authority, self.is_root()) {
            (Some(authority), true) => format!("//{authority}"),
            (Some(authority), false) => format!("//{authority}{}", self.path),
            (None, _) => self.path.clone(),
        }
    }

    /// Prefix shared by the keys of every descendant of this location
    #[must_use]
    pub fn child_prefix(&self) -> String {
        let key = self.key();
        if key.ends_with('/') { key } else { key + "/" }
    }

    #[must_use]
    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    #[must_use]
    pub fn authority(&self) -> Option<&str> {
        self.authority.as_deref()
    }

    /// Path component, always absolute
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.path == "/"
    }

    /// Final path segment, empty for the root
    #[must_use]
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    /// Parent location, `None` for the root
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let idx = self.path.rfind('/')?;
        let parent = if idx == 0 { "/" } else { &self.path[..idx] };
        Some(Self {
            scheme: self.scheme.clone(),
            authority: self.authority.clone(),
            path: parent.to_string(),
        })
    }

    /// Resolve a relative name against this location
    #[must_use]
    pub fn join(&self, name: &str) -> Self {
        Self {
            scheme: self.scheme.clone(),
            authority: self.authority.clone(),
            path: normalize(&format!("{}/{name}", self.path)),
        }
    }

    /// True when `other` lies strictly below this location
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        self.authority == other.authority && other.key().starts_with(&self.child_prefix())
    }

    /// Path of this location below `ancestor`, without a leading slash
    #[must_use]
    pub fn relative_to(&self, ancestor: &Self) -> Option<String> {
        if !ancestor.is_ancestor_of(self) {
            return None;
        }
        self.key()
            .strip_prefix(&ancestor.child_prefix())
            .map(str::to_string)
    }

    /// True when `other` is a direct child of this location
    #[must_use]
    pub fn is_parent_of(&self, other: &Self) -> bool {
        other.parent().is_some_and(|p| p.key() == self.key())
    }
}

/// Collapse separators, drop `.` and resolve `..` segments
fn normalize(raw: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}

impl FromStr for StorePath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.scheme, &self.authority) {
            (Some(scheme), Some(authority)) => write!(f, "{scheme}://{authority}{}", self.path),
            _ => write!(f, "{}", self.path),
        }
    }
}

impl fmt::Debug for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorePath({self})")
    }
}
