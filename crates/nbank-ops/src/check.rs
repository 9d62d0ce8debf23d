//! Archive integrity check.
//!
//! Compares an archive's contents with what the registry says it holds:
//! every stored entry must have a registry record, be readable, and match
//! the recorded hash; every registry record must have a stored entry.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use nbank_core::archive::iter_resources;
use nbank_core::digest::{hash, HashAlgorithm};
use nbank_core::identifier::ResourceId;
use nbank_registry::{Credentials, ResourceQuery};

use crate::archive::open_archive;
use crate::error::OpsError;

/// Verdict for one stored entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    Ok,
    /// No registry record names this entry.
    NotInRegistry,
    /// The entry could not be read or hashed.
    Unreadable(String),
    /// The stored content does not match the recorded hash.
    HashMismatch,
}

/// One stored entry and its verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedEntry {
    pub name: String,
    pub path: PathBuf,
    pub status: EntryStatus,
}

/// Summary of an archive check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    /// Number of resources the registry places in this archive.
    pub registry_total: usize,
    /// Every stored entry, in path order.
    pub entries: Vec<CheckedEntry>,
    /// Registry records with no stored entry.
    pub missing_from_archive: Vec<String>,
}

impl CheckReport {
    pub fn ok_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == EntryStatus::Ok)
            .count()
    }

    pub fn missing_from_registry(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == EntryStatus::NotInRegistry)
            .count()
    }

    /// Registry resources that are missing or failed to read or verify.
    pub fn error_count(&self) -> usize {
        self.registry_total - self.ok_count()
    }

    pub fn is_clean(&self) -> bool {
        self.ok_count() == self.registry_total && self.missing_from_registry() == 0
    }
}

/// Check the archive at `path` against its registry.
pub async fn check_archive(path: &Path, credentials: Option<Credentials>) -> Result<CheckReport, OpsError> {
    let archive = open_archive(path, credentials).await?;
    tracing::info!(archive = %archive.name, "retrieving registry records");
    let query = ResourceQuery {
        location: Some(archive.name.clone()),
        ..ResourceQuery::default()
    };
    let mut expected: BTreeMap<String, Option<String>> = archive
        .client
        .search(&query)
        .await?
        .into_iter()
        .map(|r| (r.name, r.sha1))
        .collect();
    let registry_total = expected.len();

    let mut entries = Vec::new();
    for stored in iter_resources(&archive.config.path)? {
        let name = ResourceId::from_path(&stored)
            .map(String::from)
            .unwrap_or_else(|_| stored.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default());
        let status = match expected.remove(&name) {
            None => EntryStatus::NotInRegistry,
            Some(sha1) => match hash(&stored, HashAlgorithm::Sha1) {
                Err(e) => EntryStatus::Unreadable(e.to_string()),
                Ok(digest) if sha1.as_deref() == Some(digest.as_str()) => EntryStatus::Ok,
                Ok(_) => EntryStatus::HashMismatch,
            },
        };
        match &status {
            EntryStatus::Ok => tracing::debug!(name = %name, "ok"),
            other => tracing::error!(name = %name, path = %stored.display(), "check failed: {other:?}"),
        }
        entries.push(CheckedEntry {
            name,
            path: stored,
            status,
        });
    }

    let missing_from_archive: Vec<String> = expected.into_keys().collect();
    for name in &missing_from_archive {
        tracing::error!(name = %name, "not found in the archive");
    }
    Ok(CheckReport {
        registry_total,
        entries,
        missing_from_archive,
    })
}
