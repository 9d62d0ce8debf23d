//! Errors that abort a whole operation.
//!
//! Problems with a single item of a batch are reported as outcomes, not
//! errors; see [`crate::deposit::ItemOutcome`] and [`crate::fetch::FetchOutcome`].

use std::path::PathBuf;

use nbank_core::error::{ArchiveError, HashError};
use nbank_registry::RegistryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpsError {
    /// The archive is invalid or unusable.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// The registry has no record of the archive at this path.
    #[error("archive '{}' not in registry. did it move?", .0.display())]
    UnregisteredArchive(PathBuf),

    /// The registry could not be reached or failed server-side.
    #[error("registry unavailable: {0}")]
    RemoteUnavailable(#[source] RegistryError),

    /// The registry rejected a request that the whole operation depends on.
    #[error(transparent)]
    Registry(RegistryError),

    /// Hashing failed.
    #[error(transparent)]
    Hash(#[from] HashError),

    /// Filesystem error outside the archive.
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<RegistryError> for OpsError {
    fn from(e: RegistryError) -> Self {
        if e.is_unavailable() {
            Self::RemoteUnavailable(e)
        } else {
            Self::Registry(e)
        }
    }
}
