//! Model registry: the fixed table of supported logical models

use healthsphere_core::{
    Error, InputDimensions, ModelDescriptor, RepresentationFormat, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Immutable table of model descriptors keyed by logical name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRegistry {
    #[serde(default = "default_version")]
    pub version: String,
    pub models: BTreeMap<String, ModelDescriptor>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl ModelRegistry {
    /// Build a registry from descriptors, keyed by their logical names
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ModelDescriptor>) -> Self {
        let models = descriptors
            .into_iter()
            .map(|d| (d.logical_name.clone(), d))
            .collect();

        Self {
            version: default_version(),
            models,
        }
    }

    /// The built-in table: retina, chest x-ray and brain MRI classifiers
    pub fn builtin() -> Self {
        Self::from_descriptors([
            ModelDescriptor::new(
                "eye",
                "eye_vgg16.safetensors",
                RepresentationFormat::Native,
                InputDimensions::square(128),
                labels(&[
                    "Age-Related Macular Degeneration",
                    "Branch Retinal Vein Occlusion",
                    "Diabetic Neuropathy",
                    "Diabetic Retinopathy",
                    "Macular Hole",
                    "Myopia",
                    "Optic Disc Cupping",
                    "Optic Disc Edema",
                    "Optic Disc Pigmentation",
                    "Total Scleral Neurodegeneration",
                ]),
            ),
            ModelDescriptor::new(
                "chest",
                "chest_xray_model.onnx",
                RepresentationFormat::Interpreter,
                InputDimensions::square(256),
                labels(&["NORMAL", "PNEUMONIA"]),
            )
            .with_normalization(true),
            ModelDescriptor::new(
                "brain",
                "brain_tumor_best_model.safetensors",
                RepresentationFormat::Native,
                InputDimensions::square(150),
                labels(&[
                    "glioma_tumor",
                    "no_tumor",
                    "meningioma_tumor",
                    "pituitary_tumor",
                ]),
            ),
        ])
    }

    /// Load model registry from YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "Failed to read model registry {}: {}",
                path.display(),
                e
            ))
        })?;
        let registry = Self::from_yaml(&contents)?;
        info!(
            "Loaded model registry {} with {} models",
            path.display(),
            registry.models.len()
        );
        Ok(registry)
    }

    /// Parse and validate a registry from YAML text
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut registry: ModelRegistry = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Failed to parse model registry: {}", e)))?;

        for (name, descriptor) in registry.models.iter_mut() {
            if descriptor.logical_name.is_empty() {
                descriptor.logical_name = name.clone();
            } else if &descriptor.logical_name != name {
                return Err(Error::config(format!(
                    "Model '{}' declares mismatched logical_name '{}'",
                    name, descriptor.logical_name
                )));
            }
            validate_descriptor(descriptor)?;
        }

        Ok(registry)
    }

    /// Fill in missing source locations as `<base_url>/<backing_filename>`
    pub fn with_source_base(mut self, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        for descriptor in self.models.values_mut() {
            if descriptor.source_location.is_none() {
                descriptor.source_location =
                    Some(format!("{}/{}", base, descriptor.backing_filename));
            }
        }
        self
    }

    /// Get a model descriptor by logical name
    pub fn get_model(&self, name: &str) -> Option<&ModelDescriptor> {
        self.models.get(name)
    }

    /// Logical names of all configured models, sorted
    pub fn model_names(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn labels(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn validate_descriptor(descriptor: &ModelDescriptor) -> Result<()> {
    let name = &descriptor.logical_name;
    if descriptor.labels.is_empty() {
        return Err(Error::config(format!("Model '{}' has no labels", name)));
    }
    if descriptor.input_dimensions.width == 0 || descriptor.input_dimensions.height == 0 {
        return Err(Error::config(format!(
            "Model '{}' has zero input dimensions",
            name
        )));
    }
    // Artifacts are addressed by file name inside the model directory only
    let file = Path::new(&descriptor.backing_filename);
    if descriptor.backing_filename.is_empty()
        || file.components().count() != 1
        || file.file_name().is_none()
    {
        return Err(Error::config(format!(
            "Model '{}' has invalid backing filename '{}'",
            name, descriptor.backing_filename
        )));
    }
    Ok(())
}
