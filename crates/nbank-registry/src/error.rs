//! Registry client error types.

use std::path::PathBuf;

/// Errors from registry calls.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// HTTP transport error: connection refused, DNS, timeout, TLS.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        source: reqwest::Error,
    },
    /// The registry returned a non-2xx status.
    #[error("registry {endpoint} returned {status}: {body}")]
    ApiError {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// Response deserialization failed.
    #[error("failed to deserialize response from {endpoint}: {source}")]
    Deserialization {
        endpoint: String,
        source: reqwest::Error,
    },
    /// An element of a streamed JSON response could not be parsed.
    #[error("malformed record in response from {endpoint}: {source}")]
    Stream {
        endpoint: String,
        source: serde_json::Error,
    },
    /// Writing a download to disk failed.
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The download target exists and overwriting was not requested.
    #[error("{} already exists", .0.display())]
    TargetExists(PathBuf),
    /// The name cannot be a resource identifier, so no route exists for it.
    #[error(transparent)]
    InvalidIdentifier(#[from] nbank_core::error::IdentifierError),
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),
}

impl RegistryError {
    /// Whether the registry could not be reached or failed server-side. Such
    /// errors abort whole batches; anything else concerns a single request.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Http { .. } => true,
            Self::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// HTTP status of an API error response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ApiError { status, .. } => Some(*status),
            _ => None,
        }
    }
}
