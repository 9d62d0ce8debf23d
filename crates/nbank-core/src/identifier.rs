//! # Resource Identifiers
//!
//! A resource identifier is an opaque string unique within a registry. It
//! must consist only of URL-unreserved characters (`[-_~0-9a-zA-Z]`) so it
//! can be used verbatim as a path segment in registry URLs and as a file
//! name inside the archive.

use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IdentifierError;

/// A validated resource identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    /// Validate and wrap an identifier string.
    pub fn new(id: impl Into<String>) -> Result<Self, IdentifierError> {
        let id = id.into();
        if id.is_empty() {
            return Err(IdentifierError::Empty);
        }
        if !id.chars().all(is_unreserved) {
            return Err(IdentifierError::InvalidCharacters(id));
        }
        Ok(Self(id))
    }

    /// Derive an identifier from the basename of `path`, stripped of every
    /// extension (`/data/st11.tar.gz` → `st11`).
    pub fn from_path(path: &Path) -> Result<Self, IdentifierError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        // A leading dot is part of the name, not an extension separator.
        let stem = match name.get(1..).and_then(|rest| rest.find('.')) {
            Some(idx) => name[..idx + 1].to_string(),
            None => name,
        };
        Self::new(stem)
    }

    /// Generate a random UUID-based identifier.
    pub fn generate_uuid() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Return the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_unreserved(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '~')
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ResourceId {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}
