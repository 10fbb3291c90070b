use serde_json::{Map, Value};

use crate::detection::metadata::MetadataEntry;
use crate::detection::preprocessing::{self, Frame};
use crate::error::{ConfigError, GeometryError, ShapeError};
use crate::models::BBox;

/// Where a step sits in the pipeline and what it is resizing towards.
#[derive(Debug, Clone, Copy)]
pub struct StepContext {
    pub index: usize,
    pub target_width: u32,
    pub target_height: u32,
}

/// Behaviour shared by every step kind.
pub trait TransformStep {
    fn name(&self) -> &'static str;

    /// Transform the frame and record what was done to its geometry.
    fn forward(&self, frame: Frame, ctx: &StepContext) -> Result<(Frame, MetadataEntry), ShapeError>;

    /// Undo this step's geometric effect on a box.
    ///
    /// Steps without geometry only accept `MetadataEntry::None`.
    fn inverse(&self, bbox: BBox, meta: &MetadataEntry, index: usize) -> Result<BBox, GeometryError> {
        match meta {
            MetadataEntry::None => Ok(bbox),
            other => Err(GeometryError::MetadataMismatch {
                index,
                step: self.name(),
                found: other.kind(),
            }),
        }
    }
}

fn invert_scale(name: &'static str, bbox: BBox, meta: &MetadataEntry, index: usize) -> Result<BBox, GeometryError> {
    match *meta {
        MetadataEntry::ScaleFactors { sx, sy } => {
            for factor in [sx, sy] {
                if !(factor.is_finite() && factor > 0.0) {
                    return Err(GeometryError::DegenerateScale { index, step: name, factor });
                }
            }
            Ok(bbox.unscaled(sx, sy))
        }
        other => Err(GeometryError::MetadataMismatch {
            index,
            step: name,
            found: other.kind(),
        }),
    }
}

fn invert_padding(name: &'static str, bbox: BBox, meta: &MetadataEntry, index: usize) -> Result<BBox, GeometryError> {
    match *meta {
        MetadataEntry::Padding { top, left, .. } => Ok(bbox.shifted(left as f32, top as f32)),
        other => Err(GeometryError::MetadataMismatch {
            index,
            step: name,
            found: other.kind(),
        }),
    }
}

fn padding_needed(name: &'static str, frame: &Frame, ctx: &StepContext) -> Result<(u32, u32), ShapeError> {
    let (width, height) = frame.dimensions();
    if width > ctx.target_width || height > ctx.target_height {
        return Err(ShapeError::ExceedsTarget {
            index: ctx.index,
            step: name,
            width,
            height,
            target_width: ctx.target_width,
            target_height: ctx.target_height,
        });
    }
    Ok((ctx.target_height - height, ctx.target_width - width))
}

/// Divide every pixel by `max_value` and switch to floating point.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardizeStep {
    pub max_value: f32,
}

impl TransformStep for StandardizeStep {
    fn name(&self) -> &'static str {
        "Standardize"
    }

    fn forward(&self, frame: Frame, _ctx: &StepContext) -> Result<(Frame, MetadataEntry), ShapeError> {
        Ok((preprocessing::standardize(frame, self.max_value), MetadataEntry::None))
    }
}

/// Per-channel `(x - mean) / std`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeStep {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl TransformStep for NormalizeStep {
    fn name(&self) -> &'static str {
        "Normalize"
    }

    fn forward(&self, frame: Frame, _ctx: &StepContext) -> Result<(Frame, MetadataEntry), ShapeError> {
        Ok((preprocessing::normalize(frame, self.mean, self.std), MetadataEntry::None))
    }
}

/// Stretch to the exact target, scaling each axis independently.
#[derive(Debug, Clone, PartialEq)]
pub struct DetRescaleStep;

impl TransformStep for DetRescaleStep {
    fn name(&self) -> &'static str {
        "DetRescale"
    }

    fn forward(&self, frame: Frame, ctx: &StepContext) -> Result<(Frame, MetadataEntry), ShapeError> {
        let (width, height) = frame.dimensions();
        let sx = ctx.target_width as f64 / width as f64;
        let sy = ctx.target_height as f64 / height as f64;
        let resized = preprocessing::resize_linear(frame, ctx.target_width, ctx.target_height);
        Ok((resized, MetadataEntry::ScaleFactors { sx, sy }))
    }

    fn inverse(&self, bbox: BBox, meta: &MetadataEntry, index: usize) -> Result<BBox, GeometryError> {
        invert_scale(self.name(), bbox, meta, index)
    }
}

/// Uniform scale so the longest side fits inside the target minus a 4 pixel margin.
#[derive(Debug, Clone, PartialEq)]
pub struct DetLongMaxRescaleStep;

impl DetLongMaxRescaleStep {
    pub const MARGIN: u32 = 4;

    pub fn scale_factor(width: u32, height: u32, target_width: u32, target_height: u32) -> f64 {
        let by_height = (target_height as f64 - Self::MARGIN as f64) / height as f64;
        let by_width = (target_width as f64 - Self::MARGIN as f64) / width as f64;
        by_height.min(by_width)
    }
}

impl TransformStep for DetLongMaxRescaleStep {
    fn name(&self) -> &'static str {
        "DetLongMaxRescale"
    }

    fn forward(&self, frame: Frame, ctx: &StepContext) -> Result<(Frame, MetadataEntry), ShapeError> {
        let (width, height) = frame.dimensions();
        let scale = Self::scale_factor(width, height, ctx.target_width, ctx.target_height);

        let frame = if scale != 1.0 {
            let new_width = ((width as f64 * scale).round() as u32).max(1);
            let new_height = ((height as f64 * scale).round() as u32).max(1);
            preprocessing::resize_linear(frame, new_width, new_height)
        } else {
            frame
        };

        Ok((frame, MetadataEntry::ScaleFactors { sx: scale, sy: scale }))
    }

    fn inverse(&self, bbox: BBox, meta: &MetadataEntry, index: usize) -> Result<BBox, GeometryError> {
        invert_scale(self.name(), bbox, meta, index)
    }
}

/// Pad only on the bottom and right, leaving the image in the top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub struct BotRightPadStep {
    pub pad_value: f32,
}

impl TransformStep for BotRightPadStep {
    fn name(&self) -> &'static str {
        "BotRightPad"
    }

    fn forward(&self, frame: Frame, ctx: &StepContext) -> Result<(Frame, MetadataEntry), ShapeError> {
        let (pad_height, pad_width) = padding_needed(self.name(), &frame, ctx)?;
        let padded = preprocessing::pad_constant(frame, 0, pad_height, 0, pad_width, self.pad_value);
        Ok((
            padded,
            MetadataEntry::Padding {
                top: 0,
                bottom: pad_height,
                left: 0,
                right: pad_width,
            },
        ))
    }

    fn inverse(&self, bbox: BBox, meta: &MetadataEntry, index: usize) -> Result<BBox, GeometryError> {
        invert_padding(self.name(), bbox, meta, index)
    }
}

/// Center the image; odd padding puts the extra pixel on the bottom/right.
#[derive(Debug, Clone, PartialEq)]
pub struct CenterPadStep {
    pub pad_value: f32,
}

impl TransformStep for CenterPadStep {
    fn name(&self) -> &'static str {
        "CenterPad"
    }

    fn forward(&self, frame: Frame, ctx: &StepContext) -> Result<(Frame, MetadataEntry), ShapeError> {
        let (pad_height, pad_width) = padding_needed(self.name(), &frame, ctx)?;
        let top = pad_height / 2;
        let left = pad_width / 2;
        let bottom = pad_height - top;
        let right = pad_width - left;
        let padded = preprocessing::pad_constant(frame, top, bottom, left, right, self.pad_value);
        Ok((
            padded,
            MetadataEntry::Padding {
                top,
                bottom,
                left,
                right,
            },
        ))
    }

    fn inverse(&self, bbox: BBox, meta: &MetadataEntry, index: usize) -> Result<BBox, GeometryError> {
        invert_padding(self.name(), bbox, meta, index)
    }
}

/// The closed set of step kinds, each with typed parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Standardize(StandardizeStep),
    Normalize(NormalizeStep),
    DetRescale(DetRescaleStep),
    DetLongMaxRescale(DetLongMaxRescaleStep),
    BotRightPad(BotRightPadStep),
    CenterPad(CenterPadStep),
}

impl Step {
    pub fn standardize(max_value: f32) -> Self {
        Step::Standardize(StandardizeStep { max_value })
    }

    pub fn normalize(mean: [f32; 3], std: [f32; 3]) -> Self {
        Step::Normalize(NormalizeStep { mean, std })
    }

    pub fn det_rescale() -> Self {
        Step::DetRescale(DetRescaleStep)
    }

    pub fn det_long_max_rescale() -> Self {
        Step::DetLongMaxRescale(DetLongMaxRescaleStep)
    }

    pub fn bot_right_pad(pad_value: f32) -> Self {
        Step::BotRightPad(BotRightPadStep { pad_value })
    }

    pub fn center_pad(pad_value: f32) -> Self {
        Step::CenterPad(CenterPadStep { pad_value })
    }

    fn transform(&self) -> &dyn TransformStep {
        match self {
            Step::Standardize(step) => step,
            Step::Normalize(step) => step,
            Step::DetRescale(step) => step,
            Step::DetLongMaxRescale(step) => step,
            Step::BotRightPad(step) => step,
            Step::CenterPad(step) => step,
        }
    }

    pub fn name(&self) -> &'static str {
        self.transform().name()
    }

    pub fn forward(&self, frame: Frame, ctx: &StepContext) -> Result<(Frame, MetadataEntry), ShapeError> {
        self.transform().forward(frame, ctx)
    }

    pub fn inverse(&self, bbox: BBox, meta: &MetadataEntry, index: usize) -> Result<BBox, GeometryError> {
        self.transform().inverse(bbox, meta, index)
    }

    /// True for steps that change the frame geometry.
    pub fn is_geometric(&self) -> bool {
        !matches!(self, Step::Standardize(_) | Step::Normalize(_))
    }

    /// True for steps whose output is always exactly the target size.
    pub fn reaches_target(&self) -> bool {
        matches!(self, Step::DetRescale(_) | Step::BotRightPad(_) | Step::CenterPad(_))
    }
}

/// Resolves step names and raw JSON parameters into typed [`Step`]s.
pub struct StepRegistry;

impl StepRegistry {
    pub const NAMES: [&'static str; 6] = [
        "Standardize",
        "Normalize",
        "DetRescale",
        "DetLongMaxRescale",
        "BotRightPad",
        "CenterPad",
    ];

    /// Build a step. `params` may be `None` or JSON `null` for parameterless steps.
    pub fn resolve(name: &str, params: Option<&Value>) -> Result<Step, ConfigError> {
        let empty = Map::new();
        let params = match params {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(ConfigError::InvalidParam {
                    step: name.to_string(),
                    param: "params",
                    reason: format!("expected an object or null, got {other}"),
                });
            }
        };

        let step = match name {
            "Standardize" => {
                check_keys(name, params, &["max_value"])?;
                let max_value = number(name, params, "max_value")?;
                if max_value <= 0.0 {
                    return Err(invalid(name, "max_value", "must be greater than zero"));
                }
                Step::standardize(max_value)
            }
            "Normalize" => {
                check_keys(name, params, &["mean", "std"])?;
                let mean = triplet(name, params, "mean")?;
                let std = triplet(name, params, "std")?;
                if std.iter().any(|s| *s == 0.0) {
                    return Err(invalid(name, "std", "entries must be non-zero"));
                }
                Step::normalize(mean, std)
            }
            "DetRescale" => {
                check_keys(name, params, &[])?;
                Step::det_rescale()
            }
            "DetLongMaxRescale" => {
                check_keys(name, params, &[])?;
                Step::det_long_max_rescale()
            }
            "BotRightPad" => {
                check_keys(name, params, &["pad_value"])?;
                Step::bot_right_pad(number(name, params, "pad_value")?)
            }
            "CenterPad" => {
                check_keys(name, params, &["pad_value"])?;
                Step::center_pad(number(name, params, "pad_value")?)
            }
            unknown => return Err(ConfigError::UnknownStep(unknown.to_string())),
        };

        Ok(step)
    }
}

fn invalid(step: &str, param: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParam {
        step: step.to_string(),
        param,
        reason: reason.into(),
    }
}

fn check_keys(step: &str, params: &Map<String, Value>, allowed: &[&'static str]) -> Result<(), ConfigError> {
    match params.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(ConfigError::UnexpectedParam {
            step: step.to_string(),
            param: key.clone(),
        }),
        None => Ok(()),
    }
}

fn as_finite(step: &str, param: &'static str, value: &Value) -> Result<f32, ConfigError> {
    let v = value
        .as_f64()
        .ok_or_else(|| invalid(step, param, format!("expected a number, got {value}")))?;
    if !v.is_finite() {
        return Err(invalid(step, param, "must be finite"));
    }
    Ok(v as f32)
}

fn number(step: &str, params: &Map<String, Value>, param: &'static str) -> Result<f32, ConfigError> {
    let value = params.get(param).ok_or_else(|| ConfigError::MissingParam {
        step: step.to_string(),
        param,
    })?;
    as_finite(step, param, value)
}

fn triplet(step: &str, params: &Map<String, Value>, param: &'static str) -> Result<[f32; 3], ConfigError> {
    let value = params.get(param).ok_or_else(|| ConfigError::MissingParam {
        step: step.to_string(),
        param,
    })?;
    let items = value
        .as_array()
        .ok_or_else(|| invalid(step, param, format!("expected a list of 3 numbers, got {value}")))?;
    if items.len() != 3 {
        return Err(invalid(step, param, format!("expected 3 values, got {}", items.len())));
    }
    let mut out = [0.0f32; 3];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = as_finite(step, param, item)?;
    }
    Ok(out)
}
