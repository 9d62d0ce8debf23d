//! Creating and registering a new archive.

use std::path::Path;

use nbank_core::config::{create_archive, ArchiveConfig, ArchiveOptions};
use nbank_core::error::ArchiveError;
use nbank_core::location::NEUROBANK_SCHEME;
use nbank_registry::RegistryClient;

use crate::error::OpsError;

/// Register `directory` with the registry as a `neurobank` archive, then
/// lay out the archive on disk.
///
/// The archive is registered under `name`, or the directory's own name. The
/// directory is created if needed so that its canonical path can be
/// registered; a directory created here is removed again if registration
/// fails.
pub async fn init_archive(
    client: &RegistryClient,
    directory: &Path,
    name: Option<&str>,
    options: &ArchiveOptions,
) -> Result<ArchiveConfig, OpsError> {
    let created = !directory.exists();
    std::fs::create_dir_all(directory).map_err(|e| ArchiveError::CreateDir {
        path: directory.to_path_buf(),
        source: e,
    })?;
    let root = directory.canonicalize().map_err(|e| OpsError::Io {
        path: directory.to_path_buf(),
        source: e,
    })?;
    let name = match name {
        Some(n) => n.to_string(),
        None => root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    if let Err(e) = client
        .add_archive(&name, NEUROBANK_SCHEME, &root.to_string_lossy())
        .await
    {
        if created {
            let _ = std::fs::remove_dir(&root);
        }
        return Err(e.into());
    }
    tracing::info!(path = %root.display(), name = %name, "registered archive");

    let config = create_archive(&root, client.base_url().as_str(), options)?;
    tracing::info!(path = %root.display(), "initialized neurobank archive");
    Ok(config)
}
