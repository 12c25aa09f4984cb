//! Structural validation of on-disk artifacts
//!
//! These checks parse the artifact's container format without building an
//! executable model. They are blocking and are run on the blocking pool by
//! the fetcher.

use candle_core::safetensors::MmapedSafetensors;
use healthsphere_core::{Error, RepresentationFormat, Result};
use std::path::Path;
use tract_onnx::prelude::Framework;

/// Check that the file at `path` parses as `format`
pub fn validate_structure(path: &Path, format: RepresentationFormat) -> Result<()> {
    match format {
        RepresentationFormat::Native => validate_safetensors(path),
        RepresentationFormat::Interpreter => validate_onnx(path),
    }
}

fn validate_safetensors(path: &Path) -> Result<()> {
    // SAFETY: the fetcher holds the per-file lock, nothing mutates the file while mapped
    let tensors = unsafe { MmapedSafetensors::new(path) }.map_err(|e| {
        Error::invalid(format!(
            "{} is not a valid SafeTensors file: {}",
            path.display(),
            e
        ))
    })?;

    if tensors.tensors().is_empty() {
        return Err(Error::invalid(format!(
            "{} contains no tensors",
            path.display()
        )));
    }
    Ok(())
}

fn validate_onnx(path: &Path) -> Result<()> {
    let proto = tract_onnx::onnx().proto_model_for_path(path).map_err(|e| {
        Error::invalid(format!("{} is not a valid ONNX model: {}", path.display(), e))
    })?;

    match proto.graph {
        Some(graph) if !graph.node.is_empty() => Ok(()),
        _ => Err(Error::invalid(format!(
            "{} declares no computation graph",
            path.display()
        ))),
    }
}
