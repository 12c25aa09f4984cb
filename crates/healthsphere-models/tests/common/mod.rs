//! Test doubles and fixtures shared by the integration tests
//!
//! Provides configurable fakes for the remote store, artifact provider and
//! model loader, plus writers for small but real SafeTensors and ONNX models.

#![allow(dead_code)]

use async_trait::async_trait;
use candle_core::{Device, Tensor};
use healthsphere_core::{
    Error, InputDimensions, ModelDescriptor, RepresentationFormat, Result,
};
use healthsphere_models::{
    ArtifactProvider, InputTensor, LoadedModelHandle, ModelLoader, Predictor, RemoteStore,
};
use image::{ImageFormat, Rgb, RgbImage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const SOURCE_URL: &str = "https://models.example.com/artifact";

// ---------------------------------------------------------------------------
// Remote store

enum Payload {
    Bytes(Vec<u8>),
    /// Write these bytes, then fail as if the connection dropped
    Interrupted(Vec<u8>),
}

/// Remote store that serves a fixed payload and counts calls
pub struct FakeRemoteStore {
    reachable: bool,
    payload: Payload,
    download_delay: Option<Duration>,
    probes: AtomicUsize,
    downloads: AtomicUsize,
}

impl FakeRemoteStore {
    /// Reachable store serving `bytes`
    pub fn serving(bytes: Vec<u8>) -> Self {
        Self {
            reachable: true,
            payload: Payload::Bytes(bytes),
            download_delay: None,
            probes: AtomicUsize::new(0),
            downloads: AtomicUsize::new(0),
        }
    }

    /// Store whose probe always fails
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::serving(Vec::new())
        }
    }

    /// Reachable store whose download breaks after writing `partial`
    pub fn interrupted(partial: Vec<u8>) -> Self {
        Self {
            payload: Payload::Interrupted(partial),
            ..Self::serving(Vec::new())
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.download_delay = Some(delay);
        self
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn network_calls(&self) -> usize {
        self.probes() + self.downloads()
    }
}

#[async_trait]
impl RemoteStore for FakeRemoteStore {
    async fn probe_reachable(&self, _url: &str) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.reachable
    }

    async fn download(&self, url: &str, destination: &Path) -> Result<u64> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.download_delay {
            tokio::time::sleep(delay).await;
        }
        match &self.payload {
            Payload::Bytes(bytes) => {
                tokio::fs::write(destination, bytes).await?;
                Ok(bytes.len() as u64)
            }
            Payload::Interrupted(partial) => {
                tokio::fs::write(destination, partial).await?;
                Err(Error::unavailable(format!("connection reset while fetching {}", url)))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Artifact provider and loader

/// Provider that returns a fixed path, optionally failing the first calls
pub struct CountingProvider {
    path: PathBuf,
    failures_left: AtomicUsize,
    calls: AtomicUsize,
}

impl CountingProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            failures_left: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactProvider for CountingProvider {
    async fn ensure_artifact(&self, descriptor: &ModelDescriptor) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::unavailable(format!(
                "Source for {} is not accessible",
                descriptor.backing_filename
            )));
        }
        Ok(self.path.clone())
    }
}

/// Native predictor returning fixed scores and recording what it saw
pub struct ScriptedPredictor {
    scores: Vec<f32>,
    fail: bool,
    seen: Arc<Mutex<Vec<InputTensor>>>,
}

impl Predictor for ScriptedPredictor {
    fn predict(&self, input: &InputTensor) -> Result<Vec<f32>> {
        self.seen.lock().push(input.clone());
        if self.fail {
            return Err(Error::inference("simulated runtime failure"));
        }
        Ok(self.scores.clone())
    }
}

/// Loader producing [`ScriptedPredictor`] handles and counting decodes
pub struct CountingLoader {
    scores: Vec<f32>,
    fail_inference: bool,
    decode_delay: Duration,
    loads: AtomicUsize,
    seen: Arc<Mutex<Vec<InputTensor>>>,
}

impl CountingLoader {
    pub fn new(scores: Vec<f32>) -> Self {
        Self {
            scores,
            fail_inference: false,
            decode_delay: Duration::ZERO,
            loads: AtomicUsize::new(0),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_decode_delay(mut self, delay: Duration) -> Self {
        self.decode_delay = delay;
        self
    }

    pub fn failing_inference(mut self) -> Self {
        self.fail_inference = true;
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Inputs seen by every predictor this loader produced
    pub fn seen_inputs(&self) -> Vec<InputTensor> {
        self.seen.lock().clone()
    }
}

impl ModelLoader for CountingLoader {
    fn load(&self, _descriptor: &ModelDescriptor, _path: &Path) -> Result<LoadedModelHandle> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.decode_delay);
        Ok(LoadedModelHandle::native(ScriptedPredictor {
            scores: self.scores.clone(),
            fail: self.fail_inference,
            seen: Arc::clone(&self.seen),
        }))
    }
}

// ---------------------------------------------------------------------------
// Descriptors and images

pub fn descriptor(
    name: &str,
    filename: &str,
    format: RepresentationFormat,
    side: u32,
    labels: &[&str],
) -> ModelDescriptor {
    ModelDescriptor::new(
        name,
        filename,
        format,
        InputDimensions::square(side),
        labels.iter().map(|s| s.to_string()).collect(),
    )
    .with_source(SOURCE_URL)
    .with_minimum_size(16)
}

pub fn png(width: u32, height: u32, pixel: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb(pixel));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// Names of all files in `dir`, sorted
pub fn dir_listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// ---------------------------------------------------------------------------
// Model fixtures

/// SafeTensors checkpoint whose single dense layer scores the mean of each
/// colour channel, so the dominant channel wins. Expects `side`x`side` input
/// and three labels (red, green, blue).
pub fn channel_classifier_safetensors(side: usize) -> Vec<u8> {
    let pixels = side * side;
    let mut weight = vec![0.0f32; 3 * 3 * pixels];
    for channel in 0..3 {
        for p in 0..pixels {
            // Channel-major features: channel c occupies [c*pixels, (c+1)*pixels)
            weight[channel * 3 * pixels + channel * pixels + p] = 1.0 / pixels as f32;
        }
    }
    let weight = Tensor::from_vec(weight, (3, 3 * pixels), &Device::Cpu).unwrap();
    let bias = Tensor::zeros(3, candle_core::DType::F32, &Device::Cpu).unwrap();

    let tensors = HashMap::from([
        ("dense0.weight".to_string(), weight),
        ("dense0.bias".to_string(), bias),
    ]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fixture.safetensors");
    candle_core::safetensors::save(&tensors, &path).unwrap();
    std::fs::read(&path).unwrap()
}

/// ONNX graph: `ReduceMean(x, axes=[1,2]) -> MatMul(W)` producing one score
/// per column of `weights` (a row-major 3 x `num_labels` matrix).
pub fn channel_mix_onnx(weights: &[f32], num_labels: usize) -> Vec<u8> {
    assert_eq!(weights.len(), 3 * num_labels);

    let float_tensor_type = Pb::new().msg(1, Pb::new().int(1, 1));

    let reduce = Pb::new()
        .string(1, "x")
        .string(2, "mean")
        .string(3, "reduce")
        .string(4, "ReduceMean")
        .msg(5, Pb::new().string(1, "axes").int(8, 1).int(8, 2).int(20, 7))
        .msg(5, Pb::new().string(1, "keepdims").int(3, 0).int(20, 2));

    let matmul = Pb::new()
        .string(1, "mean")
        .string(1, "W")
        .string(2, "scores")
        .string(3, "classify")
        .string(4, "MatMul");

    let initializer = Pb::new()
        .int(1, 3)
        .int(1, num_labels as i64)
        .int(2, 1)
        .floats(4, weights)
        .string(8, "W");

    let graph = Pb::new()
        .msg(1, reduce)
        .msg(1, matmul)
        .string(2, "channel_mix")
        .msg(5, initializer)
        .msg(11, Pb::new().string(1, "x").msg(2, float_tensor_type.clone()))
        .msg(12, Pb::new().string(1, "scores").msg(2, float_tensor_type));

    Pb::new()
        .int(1, 7)
        .string(2, "healthsphere-tests")
        .msg(7, graph)
        .msg(8, Pb::new().int(2, 13))
        .0
}

/// Minimal protobuf writer for building ONNX fixtures
#[derive(Clone, Default)]
pub struct Pb(pub Vec<u8>);

impl Pb {
    pub fn new() -> Self {
        Self::default()
    }

    fn varint(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.0.push((value as u8) | 0x80);
            value >>= 7;
        }
        self.0.push(value as u8);
    }

    fn key(&mut self, field: u32, wire_type: u8) {
        self.varint(((field as u64) << 3) | wire_type as u64);
    }

    pub fn int(mut self, field: u32, value: i64) -> Self {
        self.key(field, 0);
        self.varint(value as u64);
        self
    }

    pub fn bytes(mut self, field: u32, bytes: &[u8]) -> Self {
        self.key(field, 2);
        self.varint(bytes.len() as u64);
        self.0.extend_from_slice(bytes);
        self
    }

    pub fn string(self, field: u32, value: &str) -> Self {
        self.bytes(field, value.as_bytes())
    }

    pub fn msg(self, field: u32, message: Pb) -> Self {
        self.bytes(field, &message.0)
    }

    pub fn floats(self, field: u32, values: &[f32]) -> Self {
        let packed: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.bytes(field, &packed)
    }
}
