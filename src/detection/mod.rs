pub mod decoder;
pub mod metadata;
pub mod nms;
pub mod postprocessor;
pub mod preprocessing;
pub mod preprocessor;
pub mod steps;

pub use decoder::Decoder;
pub use metadata::{MetadataEntry, MetadataStack};
pub use nms::Suppressor;
pub use postprocessor::PostProcessor;
pub use preprocessing::{ChannelOrder, Frame, PixelKind};
pub use preprocessor::{PreProcessor, PreparedFrame};
pub use steps::{Step, StepContext, StepRegistry, TransformStep};
