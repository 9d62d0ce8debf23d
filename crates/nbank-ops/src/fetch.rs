//! Bulk download of resources from their network locations.
//!
//! One bulk location query, then one download task per resource, bounded
//! by a semaphore. Outcomes are reported in completion order. Local archive
//! locations are not fetched; only remote copies are downloaded.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use nbank_core::location::{parse_location, ResourceHandle, NEUROBANK_SCHEME};
use nbank_registry::{RegistryClient, RegistryError, ResourceLocations};
use tokio::sync::Semaphore;
use tokio::task::{self, JoinError, JoinSet};

use crate::error::OpsError;

/// Upper bound on concurrent downloads by default.
const MAX_DEFAULT_POOL: usize = 8;

/// Where and how to write fetched resources.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Directory for downloaded files.
    pub dest: PathBuf,
    /// Extension appended to each downloaded file name.
    pub extension: Option<String>,
    /// Overwrite existing files.
    pub force: bool,
    /// Maximum concurrent downloads.
    pub pool_size: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            dest: PathBuf::from("."),
            extension: None,
            force: false,
            pool_size: default_pool_size(),
        }
    }
}

/// `min(available parallelism, 8)`.
pub fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_POOL)
}

/// What happened to one requested id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Downloaded { id: String, path: PathBuf },
    /// The registry returned no locations for this id.
    NoLocations { id: String },
    /// The registry has locations, but none is downloadable.
    NotDownloadable { id: String },
    Failed { id: String, reason: String },
}

impl FetchOutcome {
    pub fn id(&self) -> &str {
        match self {
            Self::Downloaded { id, .. }
            | Self::NoLocations { id }
            | Self::NotDownloadable { id }
            | Self::Failed { id, .. } => id,
        }
    }
}

/// Download every id in `ids` into `options.dest`.
///
/// Ids absent from the registry's answer are reported as
/// [`FetchOutcome::NoLocations`] after all downloads finish.
pub async fn fetch<F>(
    client: &RegistryClient,
    ids: &[String],
    options: &FetchOptions,
    mut sink: F,
) -> Result<Vec<FetchOutcome>, OpsError>
where
    F: FnMut(&FetchOutcome),
{
    let mut pending: Vec<String> = Vec::new();
    for id in ids {
        if !pending.contains(id) {
            pending.push(id.clone());
        }
    }
    let found = client.bulk_locations(&pending).await?;
    pending.retain(|id| !found.iter().any(|r| &r.name == id));

    let permits = Arc::new(Semaphore::new(options.pool_size.max(1)));
    let mut tasks = JoinSet::new();
    let mut names = HashMap::new();
    for resource in found {
        let name = resource.name.clone();
        let client = client.clone();
        let options = options.clone();
        let permits = Arc::clone(&permits);
        let handle = tasks.spawn(async move {
            let id = resource.name.clone();
            let _permit = match permits.acquire_owned().await {
                Ok(p) => p,
                Err(e) => {
                    return FetchOutcome::Failed {
                        id,
                        reason: e.to_string(),
                    }
                }
            };
            fetch_one(&client, resource, &options).await
        });
        names.insert(handle.id(), name);
    }

    let mut outcomes = Vec::with_capacity(ids.len());
    while let Some(joined) = tasks.join_next().await {
        let Some(outcome) = task_outcome(joined, &mut names) else {
            continue;
        };
        sink(&outcome);
        outcomes.push(outcome);
    }
    for id in pending {
        let outcome = FetchOutcome::NoLocations { id };
        sink(&outcome);
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

/// The outcome of a finished download task. A task that panicked or was
/// cancelled is reported as failed under the id it was spawned for.
fn task_outcome(
    joined: Result<FetchOutcome, JoinError>,
    names: &mut HashMap<task::Id, String>,
) -> Option<FetchOutcome> {
    match joined {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            tracing::error!("download task failed: {e}");
            let id = names.remove(&e.id())?;
            Some(FetchOutcome::Failed {
                id,
                reason: e.to_string(),
            })
        }
    }
}

async fn fetch_one(client: &RegistryClient, resource: ResourceLocations, options: &FetchOptions) -> FetchOutcome {
    let id = resource.name;
    if resource.locations.is_empty() {
        return FetchOutcome::NoLocations { id };
    }
    let file_name = match options.extension.as_deref() {
        Some(ext) => format!("{id}.{}", ext.trim_start_matches('.')),
        None => id.clone(),
    };
    let target = options.dest.join(file_name);

    let mut last_error = None;
    for record in &resource.locations {
        if record.scheme == NEUROBANK_SCHEME {
            continue;
        }
        let Ok(ResourceHandle::Remote(remote)) = parse_location(record, None) else {
            continue;
        };
        tracing::debug!(id = %id, url = %remote.url, "downloading");
        match client.download(&remote.url, &target, options.force).await {
            Ok(path) => return FetchOutcome::Downloaded { id, path },
            Err(e @ RegistryError::TargetExists(_)) => {
                return FetchOutcome::Failed {
                    id,
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                tracing::debug!(id = %id, url = %remote.url, "download failed: {e}");
                last_error = Some(e.to_string());
            }
        }
    }
    match last_error {
        Some(reason) => FetchOutcome::Failed { id, reason },
        None => FetchOutcome::NotDownloadable { id },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn panicked_task_is_reported_under_its_id() {
        let mut tasks = JoinSet::new();
        let mut names = HashMap::new();
        let handle = tasks.spawn(async {
            if std::hint::black_box(true) {
                panic!("boom");
            }
            FetchOutcome::NoLocations { id: String::new() }
        });
        names.insert(handle.id(), "st11".to_string());

        let joined = tasks.join_next().await.unwrap();
        let outcome = task_outcome(joined, &mut names).unwrap();
        assert!(matches!(&outcome, FetchOutcome::Failed { id, .. } if id == "st11"));
        assert!(names.is_empty());
    }

    #[test]
    fn default_pool_is_bounded() {
        let n = default_pool_size();
        assert!((1..=MAX_DEFAULT_POOL).contains(&n));
    }
}
