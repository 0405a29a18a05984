//! Common types used throughout Depot.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A logical path relative to a driver's root.
///
/// This type never represents an absolute filesystem path: leading and
/// trailing separators are stripped, `.` and empty segments are dropped and
/// `..` segments are rejected, so a resolved path can never escape the root
/// it is joined under. Both `/` and `\` are treated as separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StoragePath {
    components: Vec<String>,
}

impl StoragePath {
    /// Create the root path.
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Parse a path string into a StoragePath.
    ///
    /// # Errors
    /// - Returns `InvalidInput` if any segment is `..` or contains a NUL byte
    pub fn parse(path: &str) -> crate::Result<Self> {
        let mut components = Vec::new();
        for segment in path.split(['/', '\\']) {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(crate::Error::InvalidInput(format!(
                        "Path must not contain '..' segments: {}",
                        path
                    )));
                }
                s if s.contains('\0') => {
                    return Err(crate::Error::InvalidInput(
                        "Path must not contain NUL bytes".to_string(),
                    ));
                }
                s => components.push(s.to_string()),
            }
        }
        Ok(Self { components })
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Get the parent path, if any.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            None
        } else {
            let mut components = self.components.clone();
            components.pop();
            Some(Self { components })
        }
    }

    /// Get the file/directory name (last component).
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(|s| s.as_str())
    }

    /// Join this path with a relative path.
    pub fn join(&self, child: &str) -> crate::Result<Self> {
        let child = Self::parse(child)?;
        let mut components = self.components.clone();
        components.extend(child.components);
        Ok(Self { components })
    }

    /// Get the path components.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Slash-joined form without a leading separator; empty for the root.
    pub fn as_key(&self) -> String {
        self.components.join("/")
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.as_key())
    }
}

impl FromStr for StoragePath {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for StoragePath {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for StoragePath {
    type Error = crate::Error;

    fn try_from(value: &str) -> crate::Result<Self> {
        Self::parse(value)
    }
}

impl From<StoragePath> for String {
    fn from(path: StoragePath) -> Self {
        path.as_key()
    }
}
