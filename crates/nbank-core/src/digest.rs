//! # Content Hasher
//!
//! Computes stable hex digests for single files and for whole directory
//! trees. The registry stores these under the `sha1` field, so SHA-1 is the
//! default algorithm; the SHA-2 family is available for callers that want it.
//!
//! ## Directory digests
//!
//! A directory digest is the hash of a manifest with one
//! `"<relative-path>=<file-digest>"` line per regular file, sorted by path and
//! joined with `\n`. Paths are relative to the hashed root and always use `/`
//! as the separator, so renaming or moving the root leaves the digest
//! unchanged while any change to a file's content, name, or existence inside
//! the tree changes it.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use sha2::Digest;

use crate::error::HashError;

/// Read size for streaming file contents into the hasher.
const BLOCK_SIZE: usize = 64 * 1024;

/// The hash algorithm used to produce a content digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    /// SHA-1, the registry's native checksum.
    #[default]
    Sha1,
    /// SHA-224.
    Sha224,
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl HashAlgorithm {
    /// Returns the algorithm identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha224 => "sha224",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "sha1" => Ok(Self::Sha1),
            "sha224" => Ok(Self::Sha224),
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            _ => Err(HashError::InvalidAlgorithm(s.to_string())),
        }
    }
}

/// Hash a file or a directory tree, whichever `path` refers to.
pub fn hash(path: &Path, algorithm: HashAlgorithm) -> Result<String, HashError> {
    let meta = std::fs::metadata(path).map_err(|e| not_found_or_io(path, e))?;
    if meta.is_dir() {
        hash_directory(path, algorithm)
    } else {
        hash_file(path, algorithm)
    }
}

/// Hash the contents of a single file, reading it in fixed-size blocks.
pub fn hash_file(path: &Path, algorithm: HashAlgorithm) -> Result<String, HashError> {
    let file = File::open(path).map_err(|e| not_found_or_io(path, e))?;
    match algorithm {
        HashAlgorithm::Sha1 => stream_digest::<sha1::Sha1>(file, path),
        HashAlgorithm::Sha224 => stream_digest::<sha2::Sha224>(file, path),
        HashAlgorithm::Sha256 => stream_digest::<sha2::Sha256>(file, path),
        HashAlgorithm::Sha384 => stream_digest::<sha2::Sha384>(file, path),
        HashAlgorithm::Sha512 => stream_digest::<sha2::Sha512>(file, path),
    }
}

/// Hash every regular file under `root` into a single path-relative digest.
pub fn hash_directory(root: &Path, algorithm: HashAlgorithm) -> Result<String, HashError> {
    let meta = std::fs::metadata(root).map_err(|e| not_found_or_io(root, e))?;
    if !meta.is_dir() {
        return Err(HashError::Io {
            path: root.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
        });
    }

    let mut files = Vec::new();
    walk_files(root, &mut files).map_err(|e| HashError::Io {
        path: root.to_path_buf(),
        source: e,
    })?;

    let mut entries = Vec::with_capacity(files.len());
    for full in files {
        let Ok(rel) = full.strip_prefix(root) else {
            continue;
        };
        let key = manifest_key(rel).ok_or_else(|| HashError::NonUtf8Name(full.clone()))?;
        entries.push((key, full));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut lines = Vec::with_capacity(entries.len());
    for (key, full) in &entries {
        lines.push(format!("{key}={}", hash_file(full, algorithm)?));
    }
    Ok(digest_bytes(algorithm, lines.join("\n").as_bytes()))
}

/// Hash an in-memory byte slice.
pub fn digest_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> String {
    match algorithm {
        HashAlgorithm::Sha1 => to_hex(&sha1::Sha1::digest(bytes)),
        HashAlgorithm::Sha224 => to_hex(&sha2::Sha224::digest(bytes)),
        HashAlgorithm::Sha256 => to_hex(&sha2::Sha256::digest(bytes)),
        HashAlgorithm::Sha384 => to_hex(&sha2::Sha384::digest(bytes)),
        HashAlgorithm::Sha512 => to_hex(&sha2::Sha512::digest(bytes)),
    }
}

fn stream_digest<D: Digest>(mut file: File, path: &Path) -> Result<String, HashError> {
    let mut hasher = D::new();
    let mut buf = vec![0u8; BLOCK_SIZE];
    loop {
        let n = file.read(&mut buf).map_err(|e| HashError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(to_hex(&hasher.finalize()))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Relative path rendered with `/` separators regardless of platform.
/// `None` if any component is not valid UTF-8.
fn manifest_key(rel: &Path) -> Option<String> {
    let parts = rel
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

/// Collect every regular file below `dir`. Symlinks are not followed.
fn walk_files(dir: &Path, acc: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk_files(&entry.path(), acc)?;
        } else if file_type.is_file() {
            acc.push(entry.path());
        }
    }
    Ok(())
}

fn not_found_or_io(path: &Path, e: std::io::Error) -> HashError {
    if e.kind() == std::io::ErrorKind::NotFound {
        HashError::NotFound(path.to_path_buf())
    } else {
        HashError::Io {
            path: path.to_path_buf(),
            source: e,
        }
    }
}
