use ndarray::{ArrayView2, ArrayViewD, Axis, Ix2};

use crate::error::ShapeError;
use crate::models::{BBox, Candidate};

/// Turns raw score/box tensors into thresholded candidates.
#[derive(Debug, Clone, Copy)]
pub struct Decoder {
    score_thresh: f32,
}

impl Decoder {
    pub fn new(score_thresh: f32) -> Self {
        Self { score_thresh }
    }

    /// `scores` is `(n, classes)` and `boxes` is `(n, 4)`, either optionally with a
    /// leading batch axis of 1. Boxes are `x0, y0, x1, y1` in processed-image pixels.
    ///
    /// Rows whose best score is below the threshold (or NaN) are dropped; a score equal
    /// to the threshold is kept. Ties go to the lowest class index.
    pub fn decode(&self, scores: ArrayViewD<'_, f32>, boxes: ArrayViewD<'_, f32>) -> Result<Vec<Candidate>, ShapeError> {
        let scores = as_matrix(scores, "score", "(candidates, classes)")?;
        let boxes = as_matrix(boxes, "box", "(candidates, 4)")?;

        if boxes.ncols() != 4 {
            return Err(ShapeError::Tensor {
                tensor: "box",
                shape: boxes.shape().to_vec(),
                expected: "(candidates, 4)",
            });
        }
        if scores.ncols() == 0 {
            return Err(ShapeError::Tensor {
                tensor: "score",
                shape: scores.shape().to_vec(),
                expected: "(candidates, classes) with at least one class",
            });
        }
        if scores.nrows() != boxes.nrows() {
            return Err(ShapeError::RowMismatch {
                scores: scores.nrows(),
                boxes: boxes.nrows(),
            });
        }

        let mut candidates = Vec::new();
        for (row, coords) in scores.outer_iter().zip(boxes.outer_iter()) {
            let (class_id, max_score) = argmax(row.iter().copied());
            if !(max_score >= self.score_thresh) {
                continue;
            }
            candidates.push(Candidate {
                bbox: BBox::new(coords[0], coords[1], coords[2], coords[3]),
                class_id,
                score: max_score,
            });
        }

        log::debug!(
            "decoded {} of {} rows at score >= {}",
            candidates.len(),
            scores.nrows(),
            self.score_thresh
        );
        Ok(candidates)
    }
}

fn argmax(values: impl Iterator<Item = f32>) -> (usize, f32) {
    let mut best = (0, f32::NAN);
    for (index, value) in values.enumerate() {
        if value.is_nan() {
            continue;
        }
        if best.1.is_nan() || value > best.1 {
            best = (index, value);
        }
    }
    best
}

fn as_matrix<'a>(
    tensor: ArrayViewD<'a, f32>,
    name: &'static str,
    expected: &'static str,
) -> Result<ArrayView2<'a, f32>, ShapeError> {
    let shape = tensor.shape().to_vec();
    let tensor = match shape.as_slice() {
        [1, _, _] => tensor.index_axis_move(Axis(0), 0),
        [_, _] => tensor,
        _ => {
            return Err(ShapeError::Tensor {
                tensor: name,
                shape: shape.clone(),
                expected,
            });
        }
    };
    tensor
        .into_dimensionality::<Ix2>()
        .map_err(|_| ShapeError::Tensor {
            tensor: name,
            shape,
            expected,
        })
}
