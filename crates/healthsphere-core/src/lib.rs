//! HealthSphere Core
//!
//! Core types and error handling shared across HealthSphere components.
//!
//! This crate provides:
//! - Model descriptors and representation formats
//! - Prediction request/response types
//! - The error taxonomy surfaced by model provisioning and inference

pub mod error;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use types::{
    InputDimensions, ModelDescriptor, Prediction, PredictionRequest, RepresentationFormat,
    DEFAULT_MINIMUM_VALID_SIZE,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::types::{InputDimensions, ModelDescriptor, Prediction, RepresentationFormat};
}
