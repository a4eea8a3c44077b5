use thiserror::Error;

use crate::frame::PixelFormat;

/// Failure taxonomy for a single pipeline run.
///
/// Format and shape errors are recoverable: the run reports zero detections and
/// the scheduler moves on to the next admissible frame. Model-load errors are
/// fatal at startup. Inference errors are per-frame faults that the scheduler
/// logs and counts without retrying.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("unsupported pixel format {0:?}")]
    UnsupportedFormat(PixelFormat),

    #[error("malformed plane {plane}: {reason}")]
    MalformedPlane { plane: usize, reason: String },

    #[error("unrecognized {what} shape {shape:?}")]
    ShapeMismatch { what: &'static str, shape: Vec<usize> },

    #[error("failed to load model {model}: {source}")]
    ModelLoad {
        model: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("inference failed on backend {backend}: {source}")]
    Inference {
        backend: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    pub(crate) fn malformed(plane: usize, reason: impl Into<String>) -> Self {
        Self::MalformedPlane {
            plane,
            reason: reason.into(),
        }
    }

    /// Recoverable errors turn into an empty detection list for the frame.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat(_) | Self::MalformedPlane { .. } | Self::ShapeMismatch { .. }
        )
    }
}
