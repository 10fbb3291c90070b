//! Error types for the detection pipeline.

use thiserror::Error;

/// Raised while building a pipeline. A pipeline that fails with one of these never runs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unknown step '{0}'")]
    UnknownStep(String),

    #[error("step '{step}' is missing parameter '{param}'")]
    MissingParam { step: String, param: &'static str },

    #[error("step '{step}' has invalid parameter '{param}': {reason}")]
    InvalidParam {
        step: String,
        param: &'static str,
        reason: String,
    },

    #[error("step '{step}' does not take parameter '{param}'")]
    UnexpectedParam { step: String, param: String },

    #[error("malformed step entry at position {index}: {reason}")]
    MalformedStep { index: usize, reason: String },

    #[error("{name} must be within [0, 1], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f32 },

    #[error("inconsistent target shape {width}x{height}: {reason}")]
    TargetShape {
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("top_k must be at least 1, got {0}")]
    TopK(usize),

    #[error("label file {path} contains no labels")]
    EmptyLabels { path: String },

    #[error("failed to parse pipeline configuration: {0}")]
    Parse(String),
}

/// Tensor or buffer shapes that do not match what a stage expects.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    #[error("source image is empty ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("step {index} ({step}): input {width}x{height} is larger than target {target_width}x{target_height}")]
    ExceedsTarget {
        index: usize,
        step: &'static str,
        width: u32,
        height: u32,
        target_width: u32,
        target_height: u32,
    },

    #[error("preprocessed frame is {width}x{height}, model expects {target_width}x{target_height}")]
    OutputSize {
        width: u32,
        height: u32,
        target_width: u32,
        target_height: u32,
    },

    #[error("{tensor} tensor has shape {shape:?}, expected {expected}")]
    Tensor {
        tensor: &'static str,
        shape: Vec<usize>,
        expected: &'static str,
    },

    #[error("score tensor has {scores} rows but box tensor has {boxes}")]
    RowMismatch { scores: usize, boxes: usize },
}

/// Internal invariant violations in coordinate recovery. Always a defect.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("metadata stack has {metadata} entries for {steps} steps")]
    StackLength { steps: usize, metadata: usize },

    #[error("step {index} ({step}) cannot be inverted with metadata {found}")]
    MetadataMismatch {
        index: usize,
        step: &'static str,
        found: &'static str,
    },

    #[error("step {index} ({step}) recorded a degenerate scale factor {factor}")]
    DegenerateScale {
        index: usize,
        step: &'static str,
        factor: f64,
    },
}

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("failed to load model: {0}")]
    Load(String),

    #[error("inference failed: {0}")]
    Run(String),

    #[error("model produced {0} outputs, expected boxes and scores")]
    Outputs(usize),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("shape error: {0}")]
    Shape(#[from] ShapeError),

    #[error("geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_step_context() {
        let err: Error = ShapeError::ExceedsTarget {
            index: 2,
            step: "CenterPad",
            width: 700,
            height: 10,
            target_width: 640,
            target_height: 640,
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("step 2"));
        assert!(msg.contains("CenterPad"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
