use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::detect::backend::InferenceBackend;
use crate::tensor::Tensor;

/// Scripted backend for tests and model-less runs.
///
/// Validates the input shape, then returns a fixed output tensor.
pub struct StubBackend {
    name: &'static str,
    input_shape: Vec<usize>,
    output: Tensor,
    latency: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl StubBackend {
    pub fn new(name: &'static str, input_shape: Vec<usize>, output: Tensor) -> Self {
        Self {
            name,
            input_shape,
            output,
            latency: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sleep this long inside every `run`, to simulate network latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Shared counter of completed runs; stays readable after the backend is moved.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    /// Detector emitting one centered candidate of class 0 at confidence 0.9.
    ///
    /// Output is transposed, `(1, 4 + num_classes, 8)`.
    pub fn centered_detector(input_size: usize, num_classes: usize) -> Result<Self> {
        let boxes = 8;
        let attributes = 4 + num_classes;
        let mut data = vec![0.0f32; attributes * boxes];
        let size = input_size as f32;
        let values = [size * 0.5, size * 0.5, size * 0.2, size * 0.2];
        for (attribute, value) in values.iter().enumerate() {
            data[attribute * boxes] = *value;
        }
        data[4 * boxes] = 0.9;
        Ok(Self::new(
            "stub-detector",
            vec![1, input_size, input_size, 3],
            Tensor::new(vec![1, attributes, boxes], data)?,
        ))
    }

    /// Depth network returning a constant inverse-depth map.
    pub fn flat_depth(input_size: usize, inverse_depth: f32) -> Self {
        Self::new(
            "stub-depth",
            vec![1, input_size, input_size, 3],
            Tensor::filled(vec![1, input_size, input_size], inverse_depth),
        )
    }
}

impl InferenceBackend for StubBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn output_shape(&self) -> &[usize] {
        self.output.shape()
    }

    fn run(&mut self, input: &Tensor) -> Result<Tensor> {
        if input.shape() != self.input_shape.as_slice() {
            return Err(anyhow!(
                "input shape {:?} does not match declared {:?}",
                input.shape(),
                self.input_shape
            ));
        }
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}
