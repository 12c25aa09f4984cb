//! Image preprocessing into single-item input batches

use healthsphere_core::{Error, InputDimensions, ModelDescriptor, Result};
use image::imageops::FilterType;

/// Number of colour channels fed to every model
pub const CHANNELS: usize = 3;

/// A single-item batch in NHWC layout: `[1, height, width, 3]`
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    shape: [usize; 4],
    data: Vec<f32>,
}

impl InputTensor {
    /// Wrap raw NHWC data, checking it matches the shape
    pub fn new(shape: [usize; 4], data: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(Error::preprocessing(format!(
                "tensor data has {} values, shape {:?} needs {}",
                data.len(),
                shape,
                expected
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn height(&self) -> usize {
        self.shape[1]
    }

    pub fn width(&self) -> usize {
        self.shape[2]
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// Decode, resize and batch an image according to the descriptor's conventions
pub fn preprocess_for(descriptor: &ModelDescriptor, image_bytes: &[u8]) -> Result<InputTensor> {
    preprocess_image(
        image_bytes,
        descriptor.input_dimensions,
        descriptor.normalize,
    )
}

/// Decode `image_bytes`, resize to `dims` and expand into a `[1, h, w, 3]` batch
///
/// Resizing uses nearest-neighbour sampling, matching the convention the
/// bundled models were trained with. Pixel values stay in [0,255] unless
/// `normalize` is set, in which case they are rescaled to [0,1].
pub fn preprocess_image(
    image_bytes: &[u8],
    dims: InputDimensions,
    normalize: bool,
) -> Result<InputTensor> {
    if image_bytes.is_empty() {
        return Err(Error::preprocessing("image is empty"));
    }

    let decoded = image::load_from_memory(image_bytes)
        .map_err(|e| Error::preprocessing(format!("failed to decode image: {}", e)))?;

    let rgb = decoded
        .resize_exact(dims.width, dims.height, FilterType::Nearest)
        .to_rgb8();

    let scale = if normalize { 1.0 / 255.0 } else { 1.0 };
    let data = rgb
        .into_raw()
        .into_iter()
        .map(|v| f32::from(v) * scale)
        .collect();

    InputTensor::new(
        [1, dims.height as usize, dims.width as usize, CHANNELS],
        data,
    )
}
