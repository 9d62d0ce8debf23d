//! Opening a local archive together with its registry record.

use std::path::Path;

use nbank_core::config::ArchiveConfig;
use nbank_registry::{Credentials, RegistryClient, RegistryConfig};

use crate::error::OpsError;

/// A local archive matched to its registry entry.
#[derive(Debug, Clone)]
pub struct RegisteredArchive {
    pub config: ArchiveConfig,
    pub client: RegistryClient,
    /// The archive's name in the registry.
    pub name: String,
}

/// Load the archive at `path` and look it up in the registry named by its
/// configuration.
///
/// The lookup uses the canonical archive path. No match means the archive
/// moved or the registry is out of sync, and is fatal.
pub async fn open_archive(
    path: &Path,
    credentials: Option<Credentials>,
) -> Result<RegisteredArchive, OpsError> {
    let config = ArchiveConfig::load(path)?;
    tracing::info!(archive = %config.path.display(), registry = %config.registry, "opened archive");

    let registry = RegistryConfig::new(&config.registry)
        .map_err(nbank_registry::RegistryError::from)?
        .with_credentials(credentials);
    let client = RegistryClient::new(registry)?;

    let archive = client
        .find_archive_by_path(&config.path)
        .await?
        .ok_or_else(|| OpsError::UnregisteredArchive(config.path.clone()))?;
    tracing::info!(name = %archive.name, "archive registered");

    Ok(RegisteredArchive {
        config,
        client,
        name: archive.name,
    })
}
