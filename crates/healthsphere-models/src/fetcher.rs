//! Artifact fetcher: guarantees a valid local copy of a model artifact
//!
//! The fetcher is the only component touching the model directory. For a
//! descriptor it:
//! 1. validates any existing file (structure, then size) and deletes it if invalid
//! 2. probes the registered remote source before transferring anything
//! 3. downloads into a `.part` sibling and renames it into place
//! 4. re-validates the fresh file, deleting it on failure
//!
//! All filesystem work for one backing filename is serialized by a per-file lock.

use crate::locks::KeyedLocks;
use crate::remote::RemoteStore;
use crate::validate::validate_structure;
use async_trait::async_trait;
use healthsphere_core::{Error, ModelDescriptor, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const PARTIAL_SUFFIX: &str = ".part";

/// Something that can produce a validated local artifact for a descriptor
#[async_trait]
pub trait ArtifactProvider: Send + Sync {
    /// Ensure the descriptor's artifact exists locally and is valid
    async fn ensure_artifact(&self, descriptor: &ModelDescriptor) -> Result<PathBuf>;
}

/// Fetches artifacts from a [`RemoteStore`] into a dedicated model directory
pub struct ArtifactFetcher {
    model_dir: PathBuf,
    store: Arc<dyn RemoteStore>,
    locks: KeyedLocks,
}

impl ArtifactFetcher {
    /// Create a fetcher, creating the model directory if needed
    pub fn new(model_dir: impl Into<PathBuf>, store: Arc<dyn RemoteStore>) -> Result<Self> {
        let model_dir = model_dir.into();
        std::fs::create_dir_all(&model_dir).map_err(|e| {
            Error::config(format!(
                "Failed to create model directory {}: {}",
                model_dir.display(),
                e
            ))
        })?;

        Ok(Self {
            model_dir,
            store,
            locks: KeyedLocks::new(),
        })
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Local path of a descriptor's artifact
    pub fn artifact_path(&self, descriptor: &ModelDescriptor) -> PathBuf {
        self.model_dir.join(&descriptor.backing_filename)
    }

    /// Returns true if an existing artifact is valid; deletes it otherwise
    async fn keep_existing(&self, descriptor: &ModelDescriptor, path: &Path) -> Result<bool> {
        match tokio::fs::metadata(path).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        match validate(descriptor, path).await {
            Ok(size) => {
                debug!(
                    "Using cached artifact {} ({})",
                    descriptor.backing_filename,
                    format_size(size)
                );
                Ok(true)
            }
            Err(Error::ArtifactInvalid(reason)) => {
                info!(
                    "Removing invalid file {} for '{}': {}",
                    descriptor.backing_filename, descriptor.logical_name, reason
                );
                remove_if_exists(path).await?;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn download(&self, descriptor: &ModelDescriptor, path: &Path) -> Result<()> {
        let name = &descriptor.logical_name;
        let url = descriptor.source_location.as_deref().ok_or_else(|| {
            error!("No URL found for {}", descriptor.backing_filename);
            Error::unavailable(format!(
                "No source registered for {}",
                descriptor.backing_filename
            ))
        })?;

        if !self.store.probe_reachable(url).await {
            error!(
                "Source for {} ('{}') is not accessible: {}",
                descriptor.backing_filename, name, url
            );
            record_download(name, "unreachable");
            return Err(Error::unavailable(format!(
                "Source for {} is not accessible",
                descriptor.backing_filename
            )));
        }

        info!("Downloading {} from {}...", descriptor.backing_filename, url);
        let partial = partial_path(path);

        let bytes = match self.store.download(url, &partial).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to download {}: {}", descriptor.backing_filename, e);
                remove_if_exists(&partial).await?;
                record_download(name, "failed");
                return Err(e);
            }
        };
        tokio::fs::rename(&partial, path).await?;

        match validate(descriptor, path).await {
            Ok(size) => {
                info!(
                    "Successfully downloaded {} (Size: {})",
                    descriptor.backing_filename,
                    format_size(size)
                );
                record_download(name, "success");
                Ok(())
            }
            Err(e) => {
                error!(
                    "Downloaded file {} failed validation ({} transferred): {}",
                    descriptor.backing_filename,
                    format_size(bytes),
                    e
                );
                remove_if_exists(path).await?;
                record_download(name, "invalid");
                Err(match e {
                    Error::ArtifactInvalid(_) => e,
                    other => Error::invalid(other.to_string()),
                })
            }
        }
    }
}

#[async_trait]
impl ArtifactProvider for ArtifactFetcher {
    async fn ensure_artifact(&self, descriptor: &ModelDescriptor) -> Result<PathBuf> {
        let _guard = self.locks.lock(&descriptor.backing_filename).await;
        let path = self.artifact_path(descriptor);

        // Leftover from an interrupted download
        let partial = partial_path(&path);
        if remove_if_exists(&partial).await? {
            warn!("Removed stale partial download {}", partial.display());
        }

        if self.keep_existing(descriptor, &path).await? {
            return Ok(path);
        }

        self.download(descriptor, &path).await?;
        Ok(path)
    }
}

/// Structural check followed by the size threshold; returns the file size
async fn validate(descriptor: &ModelDescriptor, path: &Path) -> Result<u64> {
    let path = path.to_path_buf();
    let format = descriptor.format;
    let minimum = descriptor.minimum_valid_size;

    tokio::task::spawn_blocking(move || {
        validate_structure(&path, format)?;

        let size = std::fs::metadata(&path)?.len();
        if size < minimum {
            return Err(Error::invalid(format!(
                "{} is too small ({}, minimum {})",
                path.display(),
                format_size(size),
                format_size(minimum)
            )));
        }
        Ok(size)
    })
    .await
    .map_err(|e| Error::internal(format!("Validation task failed: {}", e)))?
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

async fn remove_if_exists(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn record_download(model: &str, outcome: &'static str) {
    metrics::counter!(
        "healthsphere_artifact_downloads_total",
        "model" => model.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

fn format_size(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
}
