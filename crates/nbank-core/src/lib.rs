//! # nbank-core
//!
//! Local side of the neurobank data-management system: content hashing,
//! resource identifiers, archive configuration, the on-disk storage layout,
//! and interpretation of registry location records.
//!
//! Nothing in this crate talks to the network. The registry client lives in
//! `nbank-registry` and the flows that combine both live in `nbank-ops`.

pub mod archive;
pub mod config;
pub mod digest;
pub mod error;
pub mod identifier;
pub mod location;
pub mod metadata;
pub mod unix;

pub use archive::{check_writable, iter_resources, resolve, resource_path, shard_key, store};
pub use config::{create_archive, ArchiveConfig, ArchiveOptions, Policy};
pub use digest::{hash, hash_directory, hash_file, HashAlgorithm};
pub use error::{ArchiveError, HashError, IdentifierError, LocationError};
pub use identifier::ResourceId;
pub use location::{parse_location, LocationRecord, ResourceHandle};
pub use metadata::{Metadata, MetadataValue};
