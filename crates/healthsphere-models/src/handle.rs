//! Loaded model handles and format-independent inference

use crate::interpreter::InterpreterModel;
use crate::preprocess::InputTensor;
use healthsphere_core::{RepresentationFormat, Result};

/// A natively decoded model that maps an input batch to per-class scores
pub trait Predictor: Send + Sync {
    fn predict(&self, input: &InputTensor) -> Result<Vec<f32>>;
}

/// Decoded, ready-to-run model
pub enum LoadedModelHandle {
    /// Natively decoded model with a callable predictor
    Native { predictor: Box<dyn Predictor> },

    /// Interpreter plan with its input/output slot indices
    Interpreter(InterpreterModel),
}

impl LoadedModelHandle {
    /// Wrap a native predictor
    pub fn native(predictor: impl Predictor + 'static) -> Self {
        Self::Native {
            predictor: Box::new(predictor),
        }
    }

    pub fn format(&self) -> RepresentationFormat {
        match self {
            Self::Native { .. } => RepresentationFormat::Native,
            Self::Interpreter(_) => RepresentationFormat::Interpreter,
        }
    }

    /// Run one inference, yielding per-class scores
    pub fn run_inference(&self, input: &InputTensor) -> Result<Vec<f32>> {
        match self {
            Self::Native { predictor } => predictor.predict(input),
            Self::Interpreter(model) => model.run(input),
        }
    }
}

impl std::fmt::Debug for LoadedModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native { .. } => f.debug_struct("Native").finish_non_exhaustive(),
            Self::Interpreter(model) => f
                .debug_struct("Interpreter")
                .field("input_slot", &model.input_slot())
                .field("output_slot", &model.output_slot())
                .finish_non_exhaustive(),
        }
    }
}
