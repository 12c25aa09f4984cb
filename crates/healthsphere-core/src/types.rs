//! Core types for HealthSphere

use serde::{Deserialize, Serialize};

/// Minimum artifact size used when a descriptor does not declare one (10 MiB)
pub const DEFAULT_MINIMUM_VALID_SIZE: u64 = 10 * 1024 * 1024;

/// On-disk/in-memory encoding of a trained model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepresentationFormat {
    /// Full convolutional checkpoint decoded natively (SafeTensors)
    Native,
    /// Compact graph run by an interpreter with explicit input/output slots (ONNX)
    Interpreter,
}

impl RepresentationFormat {
    /// Human-readable format name for logs and errors
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Interpreter => "interpreter",
        }
    }
}

impl std::fmt::Display for RepresentationFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Spatial size a model expects its input image to be resized to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDimensions {
    pub width: u32,
    pub height: u32,
}

impl InputDimensions {
    pub const fn square(side: u32) -> Self {
        Self {
            width: side,
            height: side,
        }
    }
}

/// Static configuration entry for one supported logical model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Logical model name ("eye", "chest", ...); filled from the registry key when omitted
    #[serde(default)]
    pub logical_name: String,

    /// File name of the artifact inside the model directory
    pub backing_filename: String,

    /// Remote location the artifact is downloaded from
    #[serde(default)]
    pub source_location: Option<String>,

    /// How the artifact is encoded
    pub format: RepresentationFormat,

    /// Artifacts smaller than this many bytes are treated as corrupt
    #[serde(default = "default_minimum_valid_size")]
    pub minimum_valid_size: u64,

    /// Image size expected by the model
    pub input_dimensions: InputDimensions,

    /// Class labels, indexed by model output position
    pub labels: Vec<String>,

    /// Rescale pixel values to [0,1] instead of feeding raw [0,255]
    #[serde(default)]
    pub normalize: bool,
}

fn default_minimum_valid_size() -> u64 {
    DEFAULT_MINIMUM_VALID_SIZE
}

impl ModelDescriptor {
    /// Create a descriptor with no remote source and the default size threshold
    pub fn new(
        logical_name: impl Into<String>,
        backing_filename: impl Into<String>,
        format: RepresentationFormat,
        input_dimensions: InputDimensions,
        labels: Vec<String>,
    ) -> Self {
        Self {
            logical_name: logical_name.into(),
            backing_filename: backing_filename.into(),
            source_location: None,
            format,
            minimum_valid_size: DEFAULT_MINIMUM_VALID_SIZE,
            input_dimensions,
            labels,
            normalize: false,
        }
    }

    /// Set the remote source location
    pub fn with_source(mut self, url: impl Into<String>) -> Self {
        self.source_location = Some(url.into());
        self
    }

    /// Set the minimum valid artifact size in bytes
    pub fn with_minimum_size(mut self, bytes: u64) -> Self {
        self.minimum_valid_size = bytes;
        self
    }

    /// Enable or disable [0,1] input rescaling
    pub fn with_normalization(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Number of classes the model predicts
    pub fn num_labels(&self) -> usize {
        self.labels.len()
    }
}

/// Transient prediction request
#[derive(Debug, Clone)]
pub struct PredictionRequest {
    pub logical_model_name: String,
    pub raw_image_bytes: Vec<u8>,
}

impl PredictionRequest {
    pub fn new(logical_model_name: impl Into<String>, raw_image_bytes: Vec<u8>) -> Self {
        Self {
            logical_model_name: logical_model_name.into(),
            raw_image_bytes,
        }
    }
}

/// Outcome of a single prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Winning label
    pub label: String,

    /// Index of the winning label
    pub index: usize,

    /// Score of the winning label
    pub score: f32,

    /// All per-class scores, in label order
    pub scores: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_builder() {
        let descriptor = ModelDescriptor::new(
            "chest",
            "chest_xray_model.onnx",
            RepresentationFormat::Interpreter,
            InputDimensions::square(256),
            vec!["NORMAL".to_string(), "PNEUMONIA".to_string()],
        )
        .with_source("https://models.example.com/chest_xray_model.onnx")
        .with_minimum_size(1024)
        .with_normalization(true);

        assert_eq!(descriptor.num_labels(), 2);
        assert_eq!(descriptor.minimum_valid_size, 1024);
        assert!(descriptor.normalize);
        assert!(descriptor.source_location.is_some());
    }

    #[test]
    fn test_descriptor_yaml_defaults() {
        let yaml = r#"
backing_filename: "brain.safetensors"
format: native
input_dimensions: { width: 150, height: 150 }
labels: ["glioma_tumor", "no_tumor"]
"#;
        let descriptor: ModelDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(descriptor.format, RepresentationFormat::Native);
        assert_eq!(descriptor.minimum_valid_size, DEFAULT_MINIMUM_VALID_SIZE);
        assert!(!descriptor.normalize);
        assert!(descriptor.source_location.is_none());
        assert!(descriptor.logical_name.is_empty());
    }
}
