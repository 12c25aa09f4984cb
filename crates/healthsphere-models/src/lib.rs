//! HealthSphere Models
//!
//! Model provisioning and inference for the disease prediction service.
//!
//! Three layers cooperate on every prediction:
//! - [`ArtifactFetcher`]: keeps a validated copy of each model artifact in the
//!   model directory, downloading from a [`RemoteStore`] when absent or corrupt
//! - [`ModelStore`]: decodes each logical model at most once and caches the
//!   handle in memory
//! - [`Dispatcher`]: preprocesses the image, runs the cached handle and maps the
//!   best score to a label
//!
//! Two representation formats are supported: natively decoded convolutional
//! checkpoints (SafeTensors via Candle) and interpreter graphs (ONNX via tract).

pub mod dispatcher;
pub mod fetcher;
pub mod handle;
pub mod interpreter;
pub mod loader;
pub mod locks;
pub mod native;
pub mod preprocess;
pub mod registry;
pub mod remote;
pub mod store;
pub mod validate;

pub use dispatcher::{select_label, Dispatcher};
pub use fetcher::{ArtifactFetcher, ArtifactProvider};
pub use handle::{LoadedModelHandle, Predictor};
pub use interpreter::InterpreterModel;
pub use loader::{FormatLoader, ModelLoader};
pub use native::ConvNet;
pub use preprocess::{preprocess_for, preprocess_image, InputTensor};
pub use registry::ModelRegistry;
pub use remote::{HttpRemoteStore, RemoteStore};
pub use store::ModelStore;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::dispatcher::Dispatcher;
    pub use crate::fetcher::{ArtifactFetcher, ArtifactProvider};
    pub use crate::handle::{LoadedModelHandle, Predictor};
    pub use crate::registry::ModelRegistry;
    pub use crate::remote::{HttpRemoteStore, RemoteStore};
    pub use crate::store::ModelStore;
    pub use healthsphere_core::prelude::*;
}
