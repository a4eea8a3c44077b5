#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::InferenceBackend;
use crate::tensor::Tensor;

/// Tract-based backend for ONNX inference.
///
/// Loads a local model file once with a fixed NHWC input shape. Performs no
/// network I/O and writes nothing to disk.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_shape: Vec<usize>,
    output_shape: Vec<usize>,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn load<P: AsRef<Path>>(model_path: P, input_shape: &[usize]) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    input_shape.iter().copied().collect::<TVec<usize>>(),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        let output_shape = model
            .model()
            .output_fact(0)
            .context("model declares no outputs")?
            .shape
            .as_concrete()
            .map(|dims| dims.to_vec())
            .unwrap_or_default();

        Ok(Self {
            model,
            input_shape: input_shape.to_vec(),
            output_shape,
        })
    }

    fn build_input(&self, input: &Tensor) -> Result<tract_onnx::prelude::Tensor> {
        if input.shape() != self.input_shape.as_slice() {
            return Err(anyhow!(
                "input shape {:?} does not match model input {:?}",
                input.shape(),
                self.input_shape
            ));
        }
        let array = tract_ndarray::ArrayD::from_shape_vec(
            tract_ndarray::IxDyn(input.shape()),
            input.data().to_vec(),
        )
        .context("failed to shape input tensor")?;
        Ok(array.into_tensor())
    }

    fn extract_output(&self, outputs: TVec<TValue>) -> Result<Tensor> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        Tensor::new(view.shape().to_vec(), view.iter().copied().collect())
    }
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    fn run(&mut self, input: &Tensor) -> Result<Tensor> {
        let input = self.build_input(input)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.extract_output(outputs)
    }

    fn warm_up(&mut self) -> Result<()> {
        let zeros = Tensor::filled(self.input_shape.clone(), 0.0);
        self.run(&zeros).map(|_| ())
    }
}
