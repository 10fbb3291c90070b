pub mod config;
pub mod detection;
pub mod engine;
pub mod error;
pub mod labels;
pub mod models;
pub mod pipeline;

pub use config::PipelineConfig;
pub use detection::{MetadataEntry, MetadataStack, PreProcessor, PreparedFrame, Step, StepRegistry};
pub use engine::{InferenceEngine, RawOutputs};
pub use error::{ConfigError, Error, GeometryError, InferenceError, Result, ShapeError};
pub use labels::LabelTable;
pub use models::{BBox, Candidate, Detection, PixelRect};
pub use pipeline::{Detector, ExecutionSummary, FrameDetections, FrameExecutor, Pipeline};

#[cfg(feature = "rten")]
pub use engine::RtenEngine;
