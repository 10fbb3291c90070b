//! Pipeline configuration: step list, target shape and thresholds.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::detection::preprocessing::ChannelOrder;
use crate::detection::steps::{Step, StepRegistry};
use crate::error::{ConfigError, Result};

pub const DEFAULT_TARGET_SIZE: u32 = 640;
pub const DEFAULT_SCORE_THRESH: f32 = 0.25;
pub const DEFAULT_IOU_THRESH: f32 = 0.45;
pub const DEFAULT_PAD_VALUE: f32 = 114.0;
pub const DEFAULT_MAX_VALUE: f32 = 255.0;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PipelineConfigFile {
    steps: Option<Vec<Value>>,
    target_shape: Option<Vec<u32>>,
    score_thresh: Option<f32>,
    iou_thresh: Option<f32>,
    top_k: Option<usize>,
    channel_order: Option<ChannelOrder>,
}

/// Validated, read-only configuration shared by every frame of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub steps: Vec<Step>,
    pub target_width: u32,
    pub target_height: u32,
    pub score_thresh: f32,
    pub iou_thresh: f32,
    pub top_k: Option<usize>,
    pub channel_order: ChannelOrder,
}

/// Rescale keeping aspect ratio, center pad with gray, scale to `[0, 1]`.
pub fn default_steps() -> Vec<Step> {
    vec![
        Step::det_long_max_rescale(),
        Step::center_pad(DEFAULT_PAD_VALUE),
        Step::standardize(DEFAULT_MAX_VALUE),
    ]
}

impl PipelineConfig {
    pub fn new(steps: Vec<Step>, target_width: u32, target_height: u32) -> Self {
        Self {
            steps,
            target_width,
            target_height,
            score_thresh: DEFAULT_SCORE_THRESH,
            iou_thresh: DEFAULT_IOU_THRESH,
            top_k: None,
            channel_order: ChannelOrder::default(),
        }
    }

    pub fn with_thresholds(mut self, score_thresh: f32, iou_thresh: f32) -> Self {
        self.score_thresh = score_thresh;
        self.iou_thresh = iou_thresh;
        self
    }

    pub fn with_top_k(mut self, top_k: Option<usize>) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn target_shape(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }

    /// Parse a JSON document. Absent fields take their defaults.
    pub fn from_json_str(text: &str) -> std::result::Result<Self, ConfigError> {
        let file: PipelineConfigFile =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let mut config = Self::default();
        if let Some(entries) = file.steps {
            config.steps = parse_steps(&entries)?;
        }
        if let Some(shape) = file.target_shape {
            let (width, height) = match shape.as_slice() {
                [size] => (*size, *size),
                [width, height] => (*width, *height),
                other => {
                    return Err(ConfigError::Parse(format!(
                        "target_shape must be [size] or [width, height], got {other:?}"
                    )));
                }
            };
            config.target_width = width;
            config.target_height = height;
        }
        if let Some(score) = file.score_thresh {
            config.score_thresh = score;
        }
        if let Some(iou) = file.iou_thresh {
            config.iou_thresh = iou;
        }
        if file.top_k.is_some() {
            config.top_k = file.top_k;
        }
        if let Some(order) = file.channel_order {
            config.channel_order = order;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(Self::from_json_str(&text)?)
    }

    /// Check thresholds and that the step list can actually produce the target shape.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        for (name, value) in [("score_thresh", self.score_thresh), ("iou_thresh", self.iou_thresh)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }

        let shape_error = |reason: &str| ConfigError::TargetShape {
            width: self.target_width,
            height: self.target_height,
            reason: reason.to_string(),
        };

        if self.target_width == 0 || self.target_height == 0 {
            return Err(shape_error("dimensions must be positive"));
        }

        if let Some(0) = self.top_k {
            return Err(ConfigError::TopK(0));
        }

        let margin = crate::detection::steps::DetLongMaxRescaleStep::MARGIN;
        let has_long_max = self.steps.iter().any(|s| matches!(s, Step::DetLongMaxRescale(_)));
        if has_long_max && (self.target_width <= margin || self.target_height <= margin) {
            return Err(shape_error("DetLongMaxRescale needs both dimensions larger than 4"));
        }

        match self.steps.iter().rev().find(|s| s.is_geometric()) {
            Some(step) if step.reaches_target() => Ok(()),
            Some(step) => Err(shape_error(&format!(
                "last geometric step {} does not produce the target size",
                step.name()
            ))),
            None => Err(shape_error("no step resizes or pads to the target size")),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(default_steps(), DEFAULT_TARGET_SIZE, DEFAULT_TARGET_SIZE)
    }
}

/// Accepts `{"CenterPad": {"pad_value": 114}}`, `{"DetRescale": null}` and
/// `{"name": "CenterPad", "params": {...}}`. `null` entries are skipped.
pub fn parse_steps(entries: &[Value]) -> std::result::Result<Vec<Step>, ConfigError> {
    let mut steps = Vec::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        let map = match entry {
            Value::Null => continue,
            Value::Object(map) => map,
            other => {
                return Err(ConfigError::MalformedStep {
                    index,
                    reason: format!("expected an object, got {other}"),
                });
            }
        };

        let step = if let Some(name) = map.get("name") {
            let name = name.as_str().ok_or_else(|| ConfigError::MalformedStep {
                index,
                reason: "'name' must be a string".to_string(),
            })?;
            if let Some(extra) = map.keys().find(|k| *k != "name" && *k != "params") {
                return Err(ConfigError::MalformedStep {
                    index,
                    reason: format!("unexpected key '{extra}'"),
                });
            }
            StepRegistry::resolve(name, map.get("params"))?
        } else {
            let mut items = map.iter();
            match (items.next(), items.next()) {
                (Some((name, params)), None) => StepRegistry::resolve(name, Some(params))?,
                _ => {
                    return Err(ConfigError::MalformedStep {
                        index,
                        reason: format!("expected exactly one step name, got {} keys", map.len()),
                    });
                }
            }
        };

        steps.push(step);
    }

    Ok(steps)
}
