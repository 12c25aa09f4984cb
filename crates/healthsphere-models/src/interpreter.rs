//! Compact interpreter-format models (ONNX via tract)

use crate::preprocess::{InputTensor, CHANNELS};
use healthsphere_core::{Error, ModelDescriptor, Result};
use std::path::Path;
use tract_onnx::prelude::*;
use tracing::debug;

/// A prepared interpreter plan plus its declared input/output slots
pub struct InterpreterModel {
    plan: TypedRunnableModel<TypedModel>,
    input_slot: usize,
    output_slot: usize,
}

impl InterpreterModel {
    /// Parse, type and plan the graph at `path` for the descriptor's input size
    pub fn load(path: &Path, descriptor: &ModelDescriptor) -> Result<Self> {
        let name = &descriptor.logical_name;
        let invalid =
            |e: TractError| Error::invalid(format!("Failed to prepare interpreter for '{}': {}", name, e));

        let model = tract_onnx::onnx().model_for_path(path).map_err(invalid)?;

        if model.inputs.len() != 1 {
            return Err(Error::invalid(format!(
                "'{}' graph declares {} inputs, expected a single image input",
                name,
                model.inputs.len()
            )));
        }
        let input_slot = 0;

        let dims = descriptor.input_dimensions;
        let shape = [1, dims.height as usize, dims.width as usize, CHANNELS];

        // Typing and planning fixes every intermediate tensor shape up front
        let plan = model
            .with_input_fact(input_slot, f32::fact(shape).into())
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(invalid)?;

        let output_slot = find_output_slot(plan.model(), descriptor.num_labels());
        debug!(
            "Prepared interpreter for '{}' (input slot {}, output slot {} of {})",
            name,
            input_slot,
            output_slot,
            plan.model().outputs.len()
        );

        Ok(Self {
            plan,
            input_slot,
            output_slot,
        })
    }

    pub fn input_slot(&self) -> usize {
        self.input_slot
    }

    pub fn output_slot(&self) -> usize {
        self.output_slot
    }

    /// Write `input` into the input slot, run the plan and read the output slot
    pub fn run(&self, input: &InputTensor) -> Result<Vec<f32>> {
        let tensor = Tensor::from_shape(&input.shape(), input.data())
            .map_err(|e| Error::inference(format!("Failed to build input tensor: {}", e)))?;

        let mut inputs: TVec<TValue> = tvec!();
        inputs.insert(self.input_slot, tensor.into());

        let outputs = self
            .plan
            .run(inputs)
            .map_err(|e| Error::inference(format!("Interpreter run failed: {}", e)))?;

        let output = outputs.get(self.output_slot).ok_or_else(|| {
            Error::inference(format!(
                "Interpreter produced {} outputs, output slot is {}",
                outputs.len(),
                self.output_slot
            ))
        })?;

        let scores = output
            .to_array_view::<f32>()
            .map_err(|e| Error::inference(format!("Output is not f32: {}", e)))?;
        Ok(scores.iter().copied().collect())
    }
}

/// First output whose concrete last dimension equals the label count, else 0
fn find_output_slot(model: &TypedModel, num_labels: usize) -> usize {
    (0..model.outputs.len())
        .find(|&slot| {
            model
                .output_fact(slot)
                .ok()
                .and_then(|fact| fact.shape.as_concrete().and_then(|s| s.last().copied()))
                == Some(num_labels)
        })
        .unwrap_or(0)
}
