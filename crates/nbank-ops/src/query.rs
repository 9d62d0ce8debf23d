//! Read and update flows against the registry: search, describe, locate,
//! verify, and metadata updates.

use std::path::{Path, PathBuf};

use nbank_core::digest::{hash, HashAlgorithm};
use nbank_core::error::LocationError;
use nbank_core::identifier::ResourceId;
use nbank_core::location::{parse_location, ResourceHandle};
use nbank_core::metadata::Metadata;
use nbank_registry::{RegistryClient, Resource, ResourceQuery};
use serde_json::{json, Value};

use crate::error::OpsError;

/// Resources matching `query`, across all pages.
pub async fn search(client: &RegistryClient, query: &ResourceQuery) -> Result<Vec<Resource>, OpsError> {
    Ok(client.search(query).await?)
}

/// The registry record for `id`, or `None` if the registry has none.
pub async fn describe(client: &RegistryClient, id: &str) -> Result<Option<Resource>, OpsError> {
    Ok(client.describe(id).await?)
}

/// Registry records for many ids in one request, in the order requested.
///
/// The registry silently drops unknown ids; they come back as
/// `{"id": ..., "error": "not found"}`.
pub async fn describe_many(client: &RegistryClient, ids: &[String]) -> Result<Vec<Value>, OpsError> {
    let found = client.describe_many(ids).await?;
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        match found.iter().find(|r| &r.name == id) {
            Some(r) => out.push(serde_json::to_value(r).unwrap_or_else(|_| json!({ "id": id }))),
            None => out.push(json!({ "id": id, "error": "not found" })),
        }
    }
    Ok(out)
}

/// Every location of `id`, each parsed into a handle.
///
/// `None` means the registry does not know `id`. An empty list means it
/// knows `id` but records no locations. Local locations whose files are
/// absent come back as [`LocationError::Missing`].
pub async fn find(
    client: &RegistryClient,
    id: &str,
    alt_base: Option<&Path>,
) -> Result<Option<Vec<Result<ResourceHandle, LocationError>>>, OpsError> {
    let Some(records) = client.locations(id).await? else {
        return Ok(None);
    };
    Ok(Some(
        records.iter().map(|r| parse_location(r, alt_base)).collect(),
    ))
}

/// The first usable location of `id`.
pub async fn get(
    client: &RegistryClient,
    id: &str,
    alt_base: Option<&Path>,
) -> Result<Option<ResourceHandle>, OpsError> {
    Ok(find(client, id, alt_base)
        .await?
        .and_then(|locs| locs.into_iter().find_map(Result::ok)))
}

/// Result of checking a file against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// A resource named after the file exists and its hash matches.
    Match { id: String },
    /// A resource named after the file exists with a different hash.
    Mismatch { id: String },
    /// No resource is named after the file; these have the same hash.
    HashMatches(Vec<String>),
}

/// Hash `path` and compare it with the registry.
///
/// If the registry has a resource named after the file's stem, its recorded
/// hash decides. Otherwise the registry is searched by hash.
pub async fn verify(client: &RegistryClient, path: &Path) -> Result<Verification, OpsError> {
    let digest = hash(path, HashAlgorithm::Sha1)?;
    tracing::debug!(path = %path.display(), sha1 = %digest, "verifying");
    if let Ok(id) = ResourceId::from_path(path) {
        if let Some(resource) = client.describe(id.as_str()).await? {
            return Ok(if resource.sha1.as_deref() == Some(digest.as_str()) {
                Verification::Match { id: resource.name }
            } else {
                Verification::Mismatch { id: resource.name }
            });
        }
    }
    tracing::debug!(sha1 = %digest, "searching by hash");
    let query = ResourceQuery {
        sha1: Some(digest),
        ..ResourceQuery::default()
    };
    let hits = client.search(&query).await?;
    Ok(Verification::HashMatches(hits.into_iter().map(|r| r.name).collect()))
}

/// Apply a metadata patch to each id. Keys with null values are deleted.
///
/// Returns the updated record for each id in order, or
/// `{"name": id, "error": "not found"}` for ids the registry does not have.
pub async fn update(
    client: &RegistryClient,
    ids: &[String],
    metadata: &Metadata,
) -> Result<Vec<Value>, OpsError> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        match client.update_metadata(id, metadata).await? {
            Some(r) => out.push(serde_json::to_value(&r).unwrap_or_else(|_| json!({ "name": id }))),
            None => out.push(json!({ "name": id, "error": "not found" })),
        }
    }
    Ok(out)
}

/// Create a symbolic link in `dir` pointing at a local resource. The link
/// takes the resource's file name.
pub fn link_into(handle: &ResourceHandle, dir: &Path) -> Result<PathBuf, OpsError> {
    let ResourceHandle::Local(local) = handle else {
        return Err(OpsError::Io {
            path: dir.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                format!("{handle} is not local and cannot be linked"),
            ),
        });
    };
    let name = local.path.file_name().ok_or_else(|| OpsError::Io {
        path: local.path.clone(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "resource path has no name"),
    })?;
    let link = dir.join(name);
    std::os::unix::fs::symlink(&local.path, &link).map_err(|e| OpsError::Io {
        path: link.clone(),
        source: e,
    })?;
    Ok(link)
}
