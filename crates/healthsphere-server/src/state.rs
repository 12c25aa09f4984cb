//! Application state shared by all handlers

use crate::config::ServiceConfig;
use healthsphere_models::{ArtifactFetcher, Dispatcher, HttpRemoteStore, ModelRegistry, ModelStore};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub metrics: Option<PrometheusHandle>,
    pub max_upload_bytes: usize,
    /// Where uploads are staged while a prediction runs
    pub upload_dir: PathBuf,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            dispatcher,
            metrics,
            max_upload_bytes: ServiceConfig::default().max_upload_bytes,
            upload_dir: std::env::temp_dir(),
        }
    }

    /// Stage uploads under `dir` instead of the system temp dir
    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = dir.into();
        self
    }

    /// Wire registry, remote store, fetcher, cache and dispatcher from configuration
    pub fn from_config(
        config: &ServiceConfig,
        metrics: Option<PrometheusHandle>,
    ) -> anyhow::Result<Self> {
        let mut registry = match &config.registry_path {
            Some(path) => ModelRegistry::from_file(path)?,
            None => ModelRegistry::builtin(),
        };
        if let Some(base) = &config.artifact_base_url {
            registry = registry.with_source_base(base);
        }
        info!(
            "Model registry: {} ({})",
            registry.model_names().join(", "),
            registry.version
        );

        let remote = HttpRemoteStore::with_timeouts(
            Duration::from_secs(config.remote.probe_timeout_secs),
            Duration::from_secs(config.remote.download_timeout_secs),
        )?;
        let fetcher = ArtifactFetcher::new(&config.model_dir, Arc::new(remote))?;
        info!("Model directory: {}", config.model_dir.display());

        let store = ModelStore::new(Arc::new(registry), Arc::new(fetcher));

        let upload_dir = match &config.upload_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                dir.clone()
            }
            None => std::env::temp_dir(),
        };

        Ok(Self {
            dispatcher: Dispatcher::new(Arc::new(store)),
            metrics,
            max_upload_bytes: config.max_upload_bytes,
            upload_dir,
        })
    }

    /// Logical names the service can predict with
    pub fn available_models(&self) -> Vec<String> {
        self.dispatcher.store().registry().model_names()
    }
}
