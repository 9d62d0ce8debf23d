//! # nbank-cli: the `nbank` command
//!
//! ## Subcommands
//!
//! - `nbank registry-info`: describe the registry.
//! - `nbank init`: create and register an archive.
//! - `nbank deposit`: register files and move them into an archive.
//! - `nbank locate`: print paths or URLs for resources.
//! - `nbank search`: find resources by name, type, hash, archive, or metadata.
//! - `nbank info`: print registry records.
//! - `nbank verify`: check files against recorded hashes.
//! - `nbank modify`: set or delete metadata.
//! - `nbank fetch`: download remote copies.
//! - `nbank dtype list|add`: manage datatypes.
//! - `nbank archive list|check`: list archives, check an archive's integrity.
//!
//! The registry comes from `-r URL` or `NBANK_REGISTRY`. Credentials come
//! from `-a user:password` or a `.netrc` entry for the registry host.

pub mod archive;
pub mod cli;
pub mod deposit;
pub mod fetch;
pub mod registry;
pub mod resources;

use anyhow::{Context as _, Result};
use nbank_core::metadata::{parse_key_value, Metadata, MetadataValue};
use nbank_registry::config::{ConfigError, ENV_REGISTRY};
use nbank_registry::{Credentials, RegistryClient, RegistryConfig};
use url::Url;

/// Registry settings shared by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Registry URL from `-r`, else `NBANK_REGISTRY`.
    pub registry_url: Option<String>,
    /// Credentials from `-a`. When absent, `.netrc` is consulted.
    pub credentials: Option<Credentials>,
}

impl Context {
    /// Build the context, falling back to the environment for the registry.
    pub fn new(registry_url: Option<String>, credentials: Option<Credentials>) -> Self {
        Self {
            registry_url: registry_url.or_else(|| std::env::var(ENV_REGISTRY).ok()),
            credentials,
        }
    }

    /// Client for the configured registry. Fails if none is configured.
    pub fn client(&self) -> Result<RegistryClient> {
        let url = self
            .registry_url
            .as_deref()
            .ok_or(ConfigError::MissingRegistry)?;
        self.client_at(url)
    }

    /// Client for the registry at `url`, with this context's credentials.
    pub fn client_at(&self, url: &str) -> Result<RegistryClient> {
        let config = RegistryConfig::new(url)?.with_credentials(self.credentials.clone());
        tracing::debug!(registry = %config.base_url, "registry");
        RegistryClient::new(config).context("failed to build registry client")
    }

    /// Client for a base URL parsed out of a full resource URL.
    pub fn client_for(&self, base: &Url) -> Result<RegistryClient> {
        self.client_at(base.as_str())
    }
}

/// clap value parser for `-k KEY=VALUE`.
pub fn parse_metadata_arg(arg: &str) -> std::result::Result<(String, MetadataValue), String> {
    parse_key_value(arg)
}

/// Collect `-k` pairs into a metadata map. Later values win.
pub fn collect_metadata(pairs: &[(String, MetadataValue)]) -> Metadata {
    pairs.iter().cloned().collect()
}

/// clap value parser for octal umask arguments.
pub fn parse_octal(arg: &str) -> std::result::Result<u32, String> {
    let digits = arg.trim_start_matches("0o");
    match u32::from_str_radix(digits, 8) {
        Ok(v) if v <= 0o777 => Ok(v),
        Ok(_) => Err(format!("{arg} is out of range for a umask")),
        Err(e) => Err(format!("{arg} is not an octal number: {e}")),
    }
}
