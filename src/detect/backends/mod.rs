pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

use std::path::Path;

use crate::detect::backend::InferenceBackend;
use crate::error::PipelineError;

pub use stub::StubBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

/// Load a model file into an inference backend with the given input shape.
///
/// Failure here is fatal: the pipeline cannot run without its networks.
pub fn load_model(
    path: &Path,
    input_shape: &[usize],
) -> Result<Box<dyn InferenceBackend>, PipelineError> {
    let model = path.display().to_string();
    if !path.is_file() {
        return Err(PipelineError::ModelLoad {
            model,
            source: anyhow::anyhow!("model file not found"),
        });
    }

    #[cfg(feature = "backend-tract")]
    {
        let mut backend = TractBackend::load(path, input_shape)
            .map_err(|source| PipelineError::ModelLoad { model: model.clone(), source })?;
        backend
            .warm_up()
            .map_err(|source| PipelineError::ModelLoad { model, source })?;
        Ok(Box::new(backend))
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        let _ = input_shape;
        Err(PipelineError::ModelLoad {
            model,
            source: anyhow::anyhow!("model loading requires the backend-tract feature"),
        })
    }
}
