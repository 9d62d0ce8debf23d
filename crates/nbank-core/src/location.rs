//! Interpretation of registry location records.
//!
//! The registry stores where each resource lives as `{scheme, root,
//! resource_name}`. A `neurobank` scheme names a local archive by its root
//! path; any other scheme is a network location addressed by URL.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::archive;
use crate::config::{ArchiveConfig, DEFAULT_SHARD_LENGTH};
use crate::error::LocationError;

/// Scheme of local neurobank archives.
pub const NEUROBANK_SCHEME: &str = "neurobank";

/// A location as returned by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub scheme: String,
    pub root: String,
    pub resource_name: String,
}

/// A resource stored in a locally mounted archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalResource {
    pub path: PathBuf,
}

/// A resource reachable over the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResource {
    pub url: Url,
}

/// A usable handle to one copy of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceHandle {
    Local(LocalResource),
    Remote(RemoteResource),
}

impl std::fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(r) => write!(f, "{}", r.path.display()),
            Self::Remote(r) => write!(f, "{}", r.url),
        }
    }
}

/// The archive root to use for a `neurobank` location.
///
/// With `alt_base`, the archive is looked for under `alt_base` using the last
/// component of the registered root (`/home/data/starlings` with
/// `/scratch` → `/scratch/starlings`).
pub fn effective_root(root: &str, alt_base: Option<&Path>) -> Result<PathBuf, LocationError> {
    let root = Path::new(root);
    match alt_base {
        None => Ok(root.to_path_buf()),
        Some(base) => {
            let leaf = root
                .file_name()
                .ok_or_else(|| LocationError::Malformed(format!("archive root {root:?} has no name")))?;
            Ok(base.join(leaf))
        }
    }
}

/// Turn a location record into a handle.
///
/// For local archives the stored entry must exist; when it does not, the
/// error carries the path where it was expected.
pub fn parse_location(
    record: &LocationRecord,
    alt_base: Option<&Path>,
) -> Result<ResourceHandle, LocationError> {
    if record.scheme == NEUROBANK_SCHEME {
        let root = effective_root(&record.root, alt_base)?;
        let shard_length = ArchiveConfig::load(&root)
            .map(|cfg| cfg.policy.shard_length)
            .unwrap_or(DEFAULT_SHARD_LENGTH);
        match archive::resolve(&root, &record.resource_name, shard_length) {
            Some(path) => Ok(ResourceHandle::Local(LocalResource { path })),
            None => Err(LocationError::Missing {
                id: record.resource_name.clone(),
                expected: archive::resource_path(&root, &record.resource_name, shard_length),
            }),
        }
    } else {
        let url = format!(
            "{}://{}/{}/",
            record.scheme,
            record.root.trim_end_matches('/'),
            record.resource_name
        );
        let url = Url::parse(&url).map_err(|e| LocationError::Malformed(format!("{url}: {e}")))?;
        Ok(ResourceHandle::Remote(RemoteResource { url }))
    }
}
