use anyhow::Result;

use crate::tensor::Tensor;

/// Inference runtime contract for one loaded network.
///
/// Implementations run synchronously on the calling thread. A backend is never
/// called concurrently; the scheduler owns it on a single worker thread.
pub trait InferenceBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Declared input shape, e.g. `[1, 640, 640, 3]`.
    fn input_shape(&self) -> &[usize];

    /// Declared output shape. May be empty when the runtime cannot report it
    /// before the first run.
    fn output_shape(&self) -> &[usize];

    /// Run the network on one input tensor.
    fn run(&mut self, input: &Tensor) -> Result<Tensor>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Height and width of an NHWC `[1, H, W, 3]` input shape.
pub fn nhwc_input_size(shape: &[usize]) -> Option<(usize, usize)> {
    match shape {
        [1, height, width, 3] if *height > 0 && *width > 0 => Some((*height, *width)),
        _ => None,
    }
}
