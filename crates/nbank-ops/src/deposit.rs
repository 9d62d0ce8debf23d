//! # Deposit Orchestration
//!
//! Moves files into an archive and registers them, one item at a time:
//!
//! 1. **Archive validation**: load `nbank.json`, find the archive in the
//!    registry by its canonical path, check that `resources/` is writable.
//!    Any failure here aborts before a single item is touched.
//!
//! 2. **Identifier assignment**: the file name stem, a local UUID, or left
//!    for the registry to assign, depending on policy and request.
//!
//! 3. **Hashing**: when requested or when the archive requires it.
//!
//! 4. **Registration**: `POST resources/` naming this archive as the
//!    location.
//!
//! 5. **Local storage**: move the item into the archive under the
//!    registered identifier.
//!
//! ## Failure handling
//!
//! Missing paths, disallowed directories, and identifiers already present in
//! the archive are skipped. A registry rejection (4xx) fails only that item,
//! except an authentication failure (401, 403), which aborts the batch.
//! An unreachable or failing registry (connection error, 5xx) aborts the
//! remaining batch. An item registered but not stored is reported as failed
//! and logged loudly, since the registry now lists a location that does not
//! hold it.

use std::path::{Path, PathBuf};

use nbank_core::archive::{check_writable, resolve, store};
use nbank_core::digest::{hash, HashAlgorithm};
use nbank_core::error::ArchiveError;
use nbank_core::identifier::ResourceId;
use nbank_core::metadata::Metadata;
use nbank_registry::{Credentials, NewResource, RegistryError};
use serde::Serialize;

use crate::archive::{open_archive, RegisteredArchive};
use crate::error::OpsError;

/// What to deposit and how.
#[derive(Debug, Clone, Default)]
pub struct DepositRequest {
    pub archive: PathBuf,
    pub files: Vec<PathBuf>,
    pub dtype: Option<String>,
    /// Hash every item even if the archive does not require it.
    pub hash: bool,
    /// Do not derive identifiers from file names.
    pub auto_id: bool,
    pub metadata: Metadata,
}

/// Why an item was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum SkipReason {
    /// The path does not exist.
    Missing,
    /// The path is a directory and the archive does not allow directories.
    DirectoryNotAllowed,
    /// The identifier is already stored in the archive.
    Conflict { existing: PathBuf },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => f.write_str("does not exist"),
            Self::DirectoryNotAllowed => f.write_str("is a directory"),
            Self::Conflict { existing } => {
                write!(f, "identifier already stored at {}", existing.display())
            }
        }
    }
}

/// The result for one item of a deposit batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ItemOutcome {
    Stored {
        source: PathBuf,
        id: String,
        path: PathBuf,
        /// Set when the entry was stored but its mode or group could not be
        /// applied.
        #[serde(skip_serializing_if = "Option::is_none")]
        permissions_warning: Option<String>,
    },
    Skipped {
        source: PathBuf,
        #[serde(flatten)]
        reason: SkipReason,
    },
    Failed {
        source: PathBuf,
        reason: String,
    },
}

impl ItemOutcome {
    pub fn source(&self) -> &Path {
        match self {
            Self::Stored { source, .. } | Self::Skipped { source, .. } | Self::Failed { source, .. } => {
                source
            }
        }
    }
}

/// Totals for a deposit batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DepositReport {
    pub attempted: usize,
    pub stored: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Stored items whose permissions could not be applied. Also counted in
    /// `stored`.
    pub permission_warnings: usize,
}

impl DepositReport {
    fn record(&mut self, outcome: &ItemOutcome) {
        self.attempted += 1;
        match outcome {
            ItemOutcome::Stored {
                permissions_warning, ..
            } => {
                self.stored += 1;
                if permissions_warning.is_some() {
                    self.permission_warnings += 1;
                }
            }
            ItemOutcome::Skipped { .. } => self.skipped += 1,
            ItemOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Deposit `request.files` into the archive at `request.archive`.
///
/// Each outcome is passed to `sink` as soon as it is known. The returned
/// report covers the items processed before any abort.
pub async fn deposit<F>(
    request: &DepositRequest,
    credentials: Option<Credentials>,
    mut sink: F,
) -> Result<DepositReport, OpsError>
where
    F: FnMut(&ItemOutcome),
{
    let archive = open_archive(&request.archive, credentials).await?;
    check_writable(&archive.config)?;

    let mut report = DepositReport::default();
    for src in &request.files {
        let outcome = deposit_one(&archive, request, src).await?;
        report.record(&outcome);
        sink(&outcome);
    }
    tracing::info!(
        attempted = report.attempted,
        stored = report.stored,
        skipped = report.skipped,
        failed = report.failed,
        permission_warnings = report.permission_warnings,
        "deposit finished"
    );
    Ok(report)
}

async fn deposit_one(
    archive: &RegisteredArchive,
    request: &DepositRequest,
    src: &Path,
) -> Result<ItemOutcome, OpsError> {
    let policy = &archive.config.policy;
    tracing::info!(source = %src.display(), "processing");

    let skip = |reason: SkipReason| -> Result<ItemOutcome, OpsError> {
        tracing::info!(source = %src.display(), "skipping: {reason}");
        Ok(ItemOutcome::Skipped {
            source: src.to_path_buf(),
            reason,
        })
    };
    let fail = |reason: String| -> Result<ItemOutcome, OpsError> {
        tracing::error!(source = %src.display(), "{reason}");
        Ok(ItemOutcome::Failed {
            source: src.to_path_buf(),
            reason,
        })
    };

    let meta = match std::fs::metadata(src) {
        Ok(m) => m,
        Err(_) => return skip(SkipReason::Missing),
    };
    if meta.is_dir() && !policy.allow_directories {
        return skip(SkipReason::DirectoryNotAllowed);
    }

    let id = if policy.auto_identifiers || request.auto_id {
        match policy.auto_id_type.as_deref() {
            Some("uuid") => Some(ResourceId::generate_uuid()),
            _ => None,
        }
    } else {
        match ResourceId::from_path(src) {
            Ok(id) => Some(id),
            Err(e) => return fail(e.to_string()),
        }
    };
    if let Some(id) = &id {
        if let Some(existing) = resolve(&archive.config.path, id.as_str(), policy.shard_length) {
            return skip(SkipReason::Conflict { existing });
        }
    }

    let sha1 = if request.hash || policy.require_hash {
        match hash(src, HashAlgorithm::Sha1) {
            Ok(h) => {
                tracing::info!(sha1 = %h, "hashed");
                Some(h)
            }
            Err(e) => return fail(e.to_string()),
        }
    } else {
        None
    };

    let req = NewResource {
        name: id.map(String::from),
        dtype: request.dtype.clone(),
        sha1,
        locations: vec![archive.name.clone()],
        metadata: request.metadata.clone(),
    };
    let registered = match archive.client.register(&req).await {
        Ok(r) => r,
        Err(e) if e.is_unavailable() => return Err(OpsError::RemoteUnavailable(e)),
        // Every later item would be refused too.
        Err(e) if matches!(e.status(), Some(401 | 403)) => return Err(OpsError::Registry(e)),
        Err(RegistryError::ApiError { body, .. }) => return fail(body),
        Err(e) => return fail(e.to_string()),
    };
    if let Ok(url) = archive.client.resource_url(&registered.name) {
        tracing::info!(url = %url, "registered");
    }

    let stored = ResourceId::new(registered.name.clone())
        .map_err(ArchiveError::from)
        .and_then(|id| store(&archive.config, src, &id));
    match stored {
        Ok(path) => {
            tracing::info!(path = %path.display(), "deposited");
            Ok(ItemOutcome::Stored {
                source: src.to_path_buf(),
                id: registered.name,
                path,
                permissions_warning: None,
            })
        }
        Err(ArchiveError::PermissionsNotApplied { path, reason }) => {
            tracing::warn!(path = %path.display(), "deposited, but permissions not applied: {reason}");
            Ok(ItemOutcome::Stored {
                source: src.to_path_buf(),
                id: registered.name,
                path,
                permissions_warning: Some(reason),
            })
        }
        Err(e) => fail(format!("{} registered but not stored: {e}", registered.name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(warning: Option<&str>) -> ItemOutcome {
        ItemOutcome::Stored {
            source: PathBuf::from("/tmp/st11.wav"),
            id: "st11".into(),
            path: PathBuf::from("/a/resources/st/st11.wav"),
            permissions_warning: warning.map(String::from),
        }
    }

    #[test]
    fn permission_warnings_are_counted_apart_from_clean_stores() {
        let mut report = DepositReport::default();
        report.record(&stored(None));
        report.record(&stored(Some("chown failed")));
        assert_eq!(report.attempted, 2);
        assert_eq!(report.stored, 2);
        assert_eq!(report.permission_warnings, 1);
    }

    #[test]
    fn permission_warning_appears_in_serialized_outcome() {
        let clean = serde_json::to_value(stored(None)).unwrap();
        assert_eq!(clean["status"], "stored");
        assert!(clean.get("permissions_warning").is_none());
        let warned = serde_json::to_value(stored(Some("chown failed"))).unwrap();
        assert_eq!(warned["permissions_warning"], "chown failed");
    }
}
