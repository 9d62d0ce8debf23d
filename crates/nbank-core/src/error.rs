//! # Error Hierarchy
//!
//! Structured error types for the archive side of neurobank, built with
//! `thiserror`. Each variant carries the path or identifier it concerns so
//! operators can act on the message without re-running with `--debug`.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from content hashing.
#[derive(Error, Debug)]
pub enum HashError {
    /// The path to hash does not exist.
    #[error("no such file or directory: {}", .0.display())]
    NotFound(PathBuf),

    /// The requested algorithm is not supported.
    #[error("unsupported hash algorithm: {0:?} (expected one of sha1, sha224, sha256, sha384, sha512)")]
    InvalidAlgorithm(String),

    /// A file below a hashed directory has a name that is not valid UTF-8,
    /// so it has no stable manifest key.
    #[error("cannot hash {}: file name is not valid UTF-8", .0.display())]
    NonUtf8Name(PathBuf),

    /// Reading a file failed part way.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// The file being read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors from resource identifier derivation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    /// The identifier contains characters outside `[-_~0-9a-zA-Z]`.
    #[error("resource name {0:?} contains invalid characters")]
    InvalidCharacters(String),

    /// The identifier is empty.
    #[error("resource name is empty")]
    Empty,
}

/// Errors from archive configuration, resolution, and storage.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// The path is not a valid neurobank archive.
    #[error("{} is not a valid archive: {reason}", path.display())]
    InvalidArchive {
        /// The path that was inspected.
        path: PathBuf,
        /// Why the configuration was rejected.
        reason: String,
    },

    /// The request violates the archive policy.
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    /// The identifier cannot name a stored resource.
    #[error(transparent)]
    InvalidIdentifier(#[from] IdentifierError),

    /// A resource with this identifier is already stored.
    #[error("a resource already exists for id {id} at {}", existing.display())]
    Conflict {
        /// The identifier that collided.
        id: String,
        /// The entry that already occupies the identifier.
        existing: PathBuf,
    },

    /// The archive's resource directory cannot be written by this user.
    #[error("unable to write to archive resources at {}", .0.display())]
    NotWritable(PathBuf),

    /// Creating a directory inside the archive failed.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir {
        /// The directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Moving the source into the archive failed. The source is untouched.
    #[error("failed to move {} to {}: {source}", from.display(), to.display())]
    Move {
        /// The source path.
        from: PathBuf,
        /// The intended target path.
        to: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The resource was moved but its permissions could not be applied.
    #[error("stored {} but failed to set permissions: {reason}", path.display())]
    PermissionsNotApplied {
        /// The stored path, which now exists inside the archive.
        path: PathBuf,
        /// What failed.
        reason: String,
    },

    /// Filesystem error outside the categories above.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be serialized or parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from interpreting a registry location record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocationError {
    /// The location points into a local archive, but nothing is stored there.
    #[error("{} not found in archive (expected at {})", id, expected.display())]
    Missing {
        /// The resource name from the location record.
        id: String,
        /// Where the resource should have been.
        expected: PathBuf,
    },

    /// The location record cannot be turned into a path or URL.
    #[error("malformed location record: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_display_names_id_and_path() {
        let err = ArchiveError::Conflict {
            id: "st11_1".into(),
            existing: PathBuf::from("/data/resources/st/st11_1.wav"),
        };
        let msg = err.to_string();
        assert!(msg.contains("st11_1"));
        assert!(msg.contains("/data/resources/st/st11_1.wav"));
    }

    #[test]
    fn permissions_error_is_distinct_from_move_error() {
        let moved = ArchiveError::PermissionsNotApplied {
            path: PathBuf::from("/a/resources/ab/abc"),
            reason: "chmod failed".into(),
        };
        let not_moved = ArchiveError::Move {
            from: PathBuf::from("/tmp/abc"),
            to: PathBuf::from("/a/resources/ab/abc"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(moved.to_string().starts_with("stored"));
        assert!(not_moved.to_string().starts_with("failed to move"));
    }

    #[test]
    fn invalid_algorithm_display() {
        let err = HashError::InvalidAlgorithm("md4".into());
        assert!(err.to_string().contains("md4"));
    }

    #[test]
    fn io_error_from_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = ArchiveError::from(io_err);
        assert!(err.to_string().contains("file missing"));
    }
}
