//! Decoding of validated artifacts into handles

use crate::handle::LoadedModelHandle;
use crate::interpreter::InterpreterModel;
use crate::native::ConvNet;
use healthsphere_core::{ModelDescriptor, RepresentationFormat, Result};
use std::path::Path;

/// Decodes a validated artifact into a ready-to-run handle
///
/// Decoding is blocking; callers run it on the blocking pool.
pub trait ModelLoader: Send + Sync {
    fn load(&self, descriptor: &ModelDescriptor, path: &Path) -> Result<LoadedModelHandle>;
}

/// Loader dispatching on the descriptor's representation format
#[derive(Debug, Default, Clone, Copy)]
pub struct FormatLoader;

impl ModelLoader for FormatLoader {
    fn load(&self, descriptor: &ModelDescriptor, path: &Path) -> Result<LoadedModelHandle> {
        match descriptor.format {
            RepresentationFormat::Native => {
                Ok(LoadedModelHandle::native(ConvNet::load(path, descriptor)?))
            }
            RepresentationFormat::Interpreter => Ok(LoadedModelHandle::Interpreter(
                InterpreterModel::load(path, descriptor)?,
            )),
        }
    }
}
