//! Inference cache: at most one decoded handle per logical model name

use crate::fetcher::ArtifactProvider;
use crate::handle::LoadedModelHandle;
use crate::loader::{FormatLoader, ModelLoader};
use crate::registry::ModelRegistry;
use healthsphere_core::{Error, ModelDescriptor, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OnceCell, RwLock};
use tracing::{info, warn};

type HandleCell = Arc<OnceCell<Arc<LoadedModelHandle>>>;

/// Lazily populated store of decoded models, keyed by logical name
///
/// A cache hit returns the stored handle without touching the artifact. The
/// per-name once-cell guarantees a single fetch-and-decode even when several
/// requests miss concurrently; a failed load leaves the cell empty so the next
/// request retries.
pub struct ModelStore {
    registry: Arc<ModelRegistry>,
    provider: Arc<dyn ArtifactProvider>,
    loader: Arc<dyn ModelLoader>,
    handles: RwLock<HashMap<String, HandleCell>>,
}

impl ModelStore {
    /// Create a store decoding artifacts with [`FormatLoader`]
    pub fn new(registry: Arc<ModelRegistry>, provider: Arc<dyn ArtifactProvider>) -> Self {
        Self::with_loader(registry, provider, Arc::new(FormatLoader))
    }

    /// Create a store with a custom loader
    pub fn with_loader(
        registry: Arc<ModelRegistry>,
        provider: Arc<dyn ArtifactProvider>,
        loader: Arc<dyn ModelLoader>,
    ) -> Self {
        Self {
            registry,
            provider,
            loader,
            handles: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Get the handle for `name`, fetching and decoding it on first access
    pub async fn get_or_load(&self, name: &str) -> Result<Arc<LoadedModelHandle>> {
        let descriptor = self
            .registry
            .get_model(name)
            .ok_or_else(|| Error::unknown_model(name))?;

        let cell = self.cell(name).await;
        if let Some(handle) = cell.get() {
            record_lookup(name, "hit");
            return Ok(Arc::clone(handle));
        }

        // The fill runs on its own task so a dropped requester cannot abandon
        // a decode half way; later requesters join it through the cell.
        let provider = Arc::clone(&self.provider);
        let loader = Arc::clone(&self.loader);
        let descriptor = descriptor.clone();
        let fill = tokio::spawn(async move {
            let handle = cell
                .get_or_try_init(|| load(provider.as_ref(), loader, &descriptor))
                .await?;
            Ok::<_, Error>(Arc::clone(handle))
        });

        fill.await
            .map_err(|e| Error::internal(format!("Load task for '{}' failed: {}", name, e)))?
    }

    async fn cell(&self, name: &str) -> HandleCell {
        {
            let handles = self.handles.read().await;
            if let Some(cell) = handles.get(name) {
                return Arc::clone(cell);
            }
        }

        let mut handles = self.handles.write().await;
        Arc::clone(handles.entry(name.to_string()).or_default())
    }

    /// Whether a decoded handle for `name` is currently held
    pub async fn is_loaded(&self, name: &str) -> bool {
        let handles = self.handles.read().await;
        handles.get(name).map_or(false, |cell| cell.initialized())
    }

    /// Logical names with a decoded handle, sorted
    pub async fn loaded_models(&self) -> Vec<String> {
        let handles = self.handles.read().await;
        let mut names: Vec<String> = handles
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Drop the handle for `name`; returns true if one was loaded
    ///
    /// In-flight inferences keep their handle until they finish. The next
    /// request re-validates the artifact and decodes again.
    pub async fn evict(&self, name: &str) -> bool {
        let removed = self.handles.write().await.remove(name);
        let was_loaded = removed.map_or(false, |cell| cell.initialized());
        if was_loaded {
            info!("Evicted model '{}'", name);
        }
        was_loaded
    }

    /// Drop all handles
    pub async fn clear(&self) {
        self.handles.write().await.clear();
    }

    /// Load the given models ahead of traffic; returns how many loaded
    ///
    /// Failures are logged and skipped.
    pub async fn preload(&self, names: &[String]) -> usize {
        let mut loaded = 0;
        for name in names {
            match self.get_or_load(name).await {
                Ok(_) => loaded += 1,
                Err(e) => warn!("Failed to preload '{}': {}", name, e),
            }
        }
        info!("Preloaded {}/{} models", loaded, names.len());
        loaded
    }
}

async fn load(
provider: &dyn ArtifactProvider,
loader: Arc<dyn ModelLoader>,
descriptor: &ModelDescriptor,
) -> Result<Arc<LoadedModelHandle>> {
    let name = descriptor.logical_name.clone();
    record_lookup(&name, "miss");

    let path = provider.ensure_artifact(descriptor).await?;
    info!(
        "Loading model {} for {}...",
        descriptor.backing_filename, name
    );

    let start = Instant::now();
    let owned = descriptor.clone();
    let handle = tokio::task::spawn_blocking(move || loader.load(&owned, &path))
        .await
        .map_err(|e| Error::internal(format!("Decode task for '{}' failed: {}", name, e)))?
        .map_err(|e| {
            warn!("Failed to decode model for '{}': {}", name, e);
            e
        })?;

    info!(
        "Loaded {} model for '{}' in {} ms",
        handle.format(),
        name,
        start.elapsed().as_millis()
    );
    Ok(Arc::new(handle))
}

fn record_lookup(model: &str, result: &'static str) {
    metrics::counter!(
        "healthsphere_cache_lookups_total",
        "model" => model.to_string(),
        "result" => result
    )
    .increment(1);
}
