//! Registry client configuration.
//!
//! The registry base URL comes from the `-r` flag or the `NBANK_REGISTRY`
//! environment variable. Credentials come from a `user:password` flag or,
//! failing that, a `.netrc` entry for the registry host.

use std::path::{Path, PathBuf};

use url::Url;
use zeroize::Zeroizing;

/// Environment variable holding the default registry URL.
pub const ENV_REGISTRY: &str = "NBANK_REGISTRY";

/// Environment variable overriding the request timeout.
pub const ENV_TIMEOUT: &str = "NBANK_TIMEOUT_SECS";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for connecting to a registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Base URL of the registry API. Always ends with `/`.
    pub base_url: Url,
    /// Credentials for write operations.
    pub credentials: Option<Credentials>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

/// HTTP basic-auth credentials.
///
/// Custom `Debug` implementation redacts the password.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: Zeroizing<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    /// Parse a `user:password` argument.
    pub fn parse(arg: &str) -> Result<Self, ConfigError> {
        match arg.split_once(':') {
            Some((user, password)) if !user.is_empty() => Ok(Self {
                username: user.to_string(),
                password: Zeroizing::new(password.to_string()),
            }),
            _ => Err(ConfigError::BadCredentials),
        }
    }

    /// Look up credentials for `host` in the user's netrc file (`$NETRC`,
    /// else `~/.netrc`). Returns `None` when there is no file or no entry.
    pub fn from_netrc(host: &str) -> Option<Self> {
        let path = netrc_path()?;
        let text = std::fs::read_to_string(&path).ok()?;
        let found = parse_netrc(&text, host);
        if found.is_some() {
            tracing::debug!(netrc = %path.display(), host, "using netrc credentials");
        }
        found
    }
}

fn netrc_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("NETRC") {
        return Some(PathBuf::from(p));
    }
    let home = std::env::var("HOME").ok()?;
    Some(Path::new(&home).join(".netrc"))
}

/// Find the `machine` entry for `host`, or the `default` entry, in netrc text.
pub fn parse_netrc(text: &str, host: &str) -> Option<Credentials> {
    #[derive(Default)]
    struct Entry {
        // None for the `default` entry.
        machine: Option<String>,
        login: Option<String>,
        password: Option<String>,
    }

    let mut entries: Vec<Entry> = Vec::new();
    let mut tokens = text.split_whitespace();
    while let Some(tok) = tokens.next() {
        match tok {
            "machine" => entries.push(Entry {
                machine: Some(tokens.next().unwrap_or_default().to_string()),
                ..Entry::default()
            }),
            "default" => entries.push(Entry::default()),
            "login" | "password" | "account" => {
                let value = tokens.next().map(str::to_string);
                if let Some(entry) = entries.last_mut() {
                    match tok {
                        "login" => entry.login = value,
                        "password" => entry.password = value,
                        _ => {}
                    }
                }
            }
            // Macro bodies end at a blank line, which split_whitespace hides.
            "macdef" => break,
            _ => {}
        }
    }

    let entry = entries
        .iter()
        .find(|e| e.machine.as_deref() == Some(host))
        .or_else(|| entries.iter().find(|e| e.machine.is_none()))?;
    Some(Credentials {
        username: entry.login.clone()?,
        password: Zeroizing::new(entry.password.clone().unwrap_or_default()),
    })
}

impl RegistryConfig {
    /// Build a configuration for the registry at `url`.
    pub fn new(url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: normalize_base(url)?,
            credentials: None,
            timeout_secs: timeout_from_env(),
        })
    }

    /// Build a configuration from `NBANK_REGISTRY` and `NBANK_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var(ENV_REGISTRY).map_err(|_| ConfigError::MissingRegistry)?;
        Self::new(&url)
    }

    /// Attach explicit credentials, or netrc credentials for the registry
    /// host when `explicit` is `None`.
    pub fn with_credentials(mut self, explicit: Option<Credentials>) -> Self {
        self.credentials = explicit.or_else(|| {
            self.base_url
                .host_str()
                .and_then(Credentials::from_netrc)
        });
        self
    }
}

/// Parse a registry URL and make sure it ends with `/` so relative routes
/// join beneath it.
pub fn normalize_base(raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(raw.to_string(), e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidUrl(
            raw.to_string(),
            "not a hierarchical URL".into(),
        ));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn timeout_from_env() -> u64 {
    std::env::var(ENV_TIMEOUT)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("supply a registry url with '-r' or the {ENV_REGISTRY} environment variable")]
    MissingRegistry,
    #[error("invalid registry URL {0:?}: {1}")]
    InvalidUrl(String, String),
    #[error("credentials must be given as username:password")]
    BadCredentials,
}
