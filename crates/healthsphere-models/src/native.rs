//! Natively decoded convolutional classifiers (SafeTensors + Candle)
//!
//! The network topology is implied by tensor names in the checkpoint:
//!
//! - `conv{i}.weight` `[out, in, k, k]` (+ optional `conv{i}.bias`): a
//!   same-padded convolution followed by ReLU and 2x2 max pooling
//! - `dense{i}.weight` `[out, in]` (+ optional `dense{i}.bias`): fully
//!   connected layers with ReLU between them
//!
//! Layers are applied in index order, convolutions first. Convolution output
//! is flattened channel-major before `dense0`, and the final dense layer is
//! followed by a softmax so scores are class probabilities.

use crate::handle::Predictor;
use crate::preprocess::{InputTensor, CHANNELS};
use candle_core::{Device, Tensor};
use candle_nn::{Conv2d, Conv2dConfig, Linear, Module};
use healthsphere_core::{Error, ModelDescriptor, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Convolutional classifier decoded from a SafeTensors checkpoint
pub struct ConvNet {
    convs: Vec<Conv2d>,
    dense: Vec<Linear>,
    device: Device,
}

impl ConvNet {
    /// Decode the checkpoint at `path` and check it fits the descriptor
    pub fn load(path: &Path, descriptor: &ModelDescriptor) -> Result<Self> {
        let device = Device::Cpu;
        let tensors = candle_core::safetensors::load(path, &device).map_err(|e| {
            Error::invalid(format!(
                "Failed to load SafeTensors {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_tensors(tensors, descriptor, device)
    }

    /// Build the network from named tensors
    pub fn from_tensors(
        mut tensors: HashMap<String, Tensor>,
        descriptor: &ModelDescriptor,
        device: Device,
    ) -> Result<Self> {
        let name = &descriptor.logical_name;
        let mut channels = CHANNELS;
        let mut height = descriptor.input_dimensions.height as usize;
        let mut width = descriptor.input_dimensions.width as usize;

        let mut convs = Vec::new();
        for (weight, bias) in take_layers(&mut tensors, "conv") {
            let (out_c, in_c, kh, kw) = weight
                .dims4()
                .map_err(|e| Error::invalid(format!("'{}' conv{}: {}", name, convs.len(), e)))?;
            if in_c != channels || kh != kw || kh % 2 == 0 {
                return Err(Error::invalid(format!(
                    "'{}' conv{} has shape [{}, {}, {}, {}], expected {} input channels and an odd square kernel",
                    name, convs.len(), out_c, in_c, kh, kw, channels
                )));
            }
            let config = Conv2dConfig {
                padding: kh / 2,
                ..Default::default()
            };
            convs.push(Conv2d::new(weight, bias, config));
            channels = out_c;
            height /= 2;
            width /= 2;
        }

        let mut features = channels * height * width;
        let mut dense = Vec::new();
        for (weight, bias) in take_layers(&mut tensors, "dense") {
            let (out_f, in_f) = weight
                .dims2()
                .map_err(|e| Error::invalid(format!("'{}' dense{}: {}", name, dense.len(), e)))?;
            if in_f != features {
                return Err(Error::invalid(format!(
                    "'{}' dense{} expects {} inputs but receives {}",
                    name,
                    dense.len(),
                    in_f,
                    features
                )));
            }
            dense.push(Linear::new(weight, bias));
            features = out_f;
        }

        if dense.is_empty() {
            return Err(Error::invalid(format!(
                "'{}' checkpoint has no dense layers",
                name
            )));
        }
        if features != descriptor.num_labels() {
            return Err(Error::invalid(format!(
                "'{}' produces {} scores for {} labels",
                name,
                features,
                descriptor.num_labels()
            )));
        }

        debug!(
            "Decoded '{}' with {} conv and {} dense layers",
            name,
            convs.len(),
            dense.len()
        );

        Ok(Self {
            convs,
            dense,
            device,
        })
    }

    fn forward(&self, input: &Tensor) -> candle_core::Result<Tensor> {
        // NHWC -> NCHW
        let mut x = input.permute((0, 3, 1, 2))?.contiguous()?;
        for conv in &self.convs {
            x = conv.forward(&x)?.relu()?.max_pool2d(2)?;
        }

        let mut x = x.flatten_from(1)?;
        let last = self.dense.len() - 1;
        for (i, layer) in self.dense.iter().enumerate() {
            x = layer.forward(&x)?;
            if i < last {
                x = x.relu()?;
            }
        }
        candle_nn::ops::softmax_last_dim(&x)
    }
}

impl Predictor for ConvNet {
    fn predict(&self, input: &InputTensor) -> Result<Vec<f32>> {
        let run = || -> candle_core::Result<Vec<f32>> {
            let x = Tensor::from_slice(input.data(), &input.shape(), &self.device)?;
            self.forward(&x)?.squeeze(0)?.to_vec1::<f32>()
        };
        run().map_err(|e| Error::inference(format!("Native forward pass failed: {}", e)))
    }
}

/// Remove `{prefix}0`, `{prefix}1`, ... layers in order until one is missing
fn take_layers(
    tensors: &mut HashMap<String, Tensor>,
    prefix: &str,
) -> Vec<(Tensor, Option<Tensor>)> {
    let mut layers = Vec::new();
    while let Some(weight) = tensors.remove(&format!("{}{}.weight", prefix, layers.len())) {
        let bias = tensors.remove(&format!("{}{}.bias", prefix, layers.len()));
        layers.push((weight, bias));
    }
    layers
}
