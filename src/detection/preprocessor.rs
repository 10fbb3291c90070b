use image::DynamicImage;
use ndarray::Array4;

use crate::config::PipelineConfig;
use crate::detection::metadata::MetadataStack;
use crate::detection::preprocessing::{self, ChannelOrder, Frame};
use crate::detection::steps::{Step, StepContext};
use crate::error::ShapeError;

/// Model-ready input for one frame plus what is needed to undo the steps.
#[derive(Debug, Clone)]
pub struct PreparedFrame {
    /// `(1, 3, height, width)`, channel-first.
    pub tensor: Array4<f32>,
    pub metadata: MetadataStack,
    pub source_width: u32,
    pub source_height: u32,
}

/// Runs the configured steps over a frame, in order.
#[derive(Debug, Clone)]
pub struct PreProcessor {
    steps: Vec<Step>,
    target_width: u32,
    target_height: u32,
    channel_order: ChannelOrder,
}

impl PreProcessor {
    pub fn new(steps: Vec<Step>, target_width: u32, target_height: u32) -> Self {
        Self {
            steps,
            target_width,
            target_height,
            channel_order: ChannelOrder::default(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.steps.clone(), config.target_width, config.target_height)
            .with_channel_order(config.channel_order)
    }

    pub fn with_channel_order(mut self, order: ChannelOrder) -> Self {
        self.channel_order = order;
        self
    }

    /// Convert channel order, apply every step, and pack the result as a tensor.
    pub fn run(&self, image: &DynamicImage) -> Result<PreparedFrame, ShapeError> {
        let (source_width, source_height) = (image.width(), image.height());
        let frame = Frame::from_image(image, self.channel_order);
        let (frame, metadata) = self.apply_steps(frame)?;

        let (width, height) = frame.dimensions();
        if (width, height) != (self.target_width, self.target_height) {
            return Err(ShapeError::OutputSize {
                width,
                height,
                target_width: self.target_width,
                target_height: self.target_height,
            });
        }

        Ok(PreparedFrame {
            tensor: preprocessing::to_tensor(&frame),
            metadata,
            source_width,
            source_height,
        })
    }

    /// Apply the steps to an already converted frame. One metadata entry per step.
    ///
    /// A frame with no pixels is rejected before any step sees it.
    pub fn apply_steps(&self, mut frame: Frame) -> Result<(Frame, MetadataStack), ShapeError> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Err(ShapeError::EmptyImage { width, height });
        }

        let mut metadata = MetadataStack::with_capacity(self.steps.len());

        for (index, step) in self.steps.iter().enumerate() {
            let ctx = StepContext {
                index,
                target_width: self.target_width,
                target_height: self.target_height,
            };
            let (in_w, in_h) = frame.dimensions();
            let (next, meta) = step.forward(frame, &ctx)?;
            log::trace!(
                "step {} {}: {}x{} -> {}x{} ({})",
                index,
                step.name(),
                in_w,
                in_h,
                next.width(),
                next.height(),
                meta
            );
            frame = next;
            metadata.push(meta);
        }

        debug_assert_eq!(metadata.len(), self.steps.len());
        Ok((frame, metadata))
    }
}
