#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from nasdet for tests
pub use nasdet::detection::preprocessing::{ChannelOrder, Frame, PixelKind};
pub use nasdet::detection::steps::StepContext;
pub use nasdet::{
    BBox, Candidate, ConfigError, Detector, Error, FrameExecutor, GeometryError, InferenceEngine, MetadataEntry,
    MetadataStack, Pipeline, PipelineConfig, PreProcessor, RawOutputs, ShapeError, Step, StepRegistry,
};
