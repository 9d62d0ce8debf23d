//! # nbank-registry -- Typed client for the neurobank registry
//!
//! The registry is an HTTP service holding the canonical record of every
//! resource: its identifier, datatype, hash, metadata, and the archives that
//! hold copies. This crate is the only place that builds registry URLs or
//! interprets registry responses.
//!
//! ## Error model
//!
//! - transport failures and 5xx responses: [`RegistryError::is_unavailable`]
//! - 4xx responses: [`RegistryError::ApiError`] with the body verbatim
//! - 404 on single-resource lookups: `Ok(None)`

pub mod client;
pub mod config;
pub mod error;
pub mod types;

pub use client::{parse_resource_url, RegistryClient};
pub use config::{Credentials, RegistryConfig};
pub use error::RegistryError;
pub use types::{Archive, Datatype, NewResource, RegistryInfo, Resource, ResourceLocations, ResourceQuery};
