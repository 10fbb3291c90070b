use image::{DynamicImage, ImageBuffer, Rgb};
use nasdet::error::InferenceError;
use nasdet::{BBox, RawOutputs};
use ndarray::{Array2, Array4};
use tempfile::NamedTempFile;

/// A `width x height` RGB image with a horizontal/vertical ramp, so resizes are visible.
pub fn gradient_image(width: u32, height: u32) -> DynamicImage {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        let r = (x * 255 / width.max(1)) as u8;
        let g = (y * 255 / height.max(1)) as u8;
        Rgb([r, g, 128u8])
    });
    DynamicImage::ImageRgb8(img)
}

pub fn solid_image(width: u32, height: u32, color: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb(color)))
}

/// Writes `contents` to a temp file with the given suffix.
/// The file will be automatically cleaned up when dropped.
pub fn write_temp(contents: &str, suffix: &str) -> NamedTempFile {
    let file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("Failed to create temp file");
    std::fs::write(file.path(), contents).expect("Failed to write temp file");
    file
}

/// Builds raw outputs with a batch axis, the way exported models return them.
pub fn raw_outputs(boxes: &[[f32; 4]], scores: &[&[f32]]) -> RawOutputs {
    let classes = scores.first().map_or(1, |row| row.len());
    let box_data: Vec<f32> = boxes.iter().flatten().copied().collect();
    let score_data: Vec<f32> = scores.iter().flat_map(|row| row.iter().copied()).collect();
    RawOutputs {
        boxes: Array2::from_shape_vec((boxes.len(), 4), box_data)
            .expect("box data")
            .insert_axis(ndarray::Axis(0))
            .into_dyn(),
        scores: Array2::from_shape_vec((scores.len(), classes), score_data)
            .expect("score data")
            .insert_axis(ndarray::Axis(0))
            .into_dyn(),
    }
}

/// Engine that replays the same outputs for every call and records its inputs.
pub struct MockEngine {
    pub outputs: RawOutputs,
    pub calls: usize,
    pub input_shapes: Vec<Vec<usize>>,
    pub input_sums: Vec<f32>,
    pub fail: bool,
}

impl MockEngine {
    pub fn new(outputs: RawOutputs) -> Self {
        Self {
            outputs,
            calls: 0,
            input_shapes: Vec::new(),
            input_sums: Vec::new(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        let mut engine = Self::new(raw_outputs(&[], &[]));
        engine.fail = true;
        engine
    }
}

impl nasdet::InferenceEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<RawOutputs, InferenceError> {
        self.calls += 1;
        self.input_shapes.push(input.shape().to_vec());
        self.input_sums.push(input.sum());
        if self.fail {
            return Err(InferenceError::Run("scripted failure".to_string()));
        }
        Ok(self.outputs.clone())
    }
}

pub fn approx_eq(a: f32, b: f32, eps: f32) -> bool {
    (a - b).abs() <= eps
}

pub fn assert_bbox_close(actual: BBox, expected: [f32; 4], eps: f32) {
    let got = actual.to_array();
    for (g, e) in got.iter().zip(expected.iter()) {
        assert!(approx_eq(*g, *e, eps), "expected {expected:?}, got {got:?}");
    }
}

/// Context for a step at position 0 targeting `width x height`.
pub fn ctx(width: u32, height: u32) -> nasdet::detection::StepContext {
    nasdet::detection::StepContext {
        index: 0,
        target_width: width,
        target_height: height,
    }
}
