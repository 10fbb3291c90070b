//! Boundary to the inference engine. The core never looks inside it.

#[cfg(feature = "rten")]
mod rten_backend;

#[cfg(feature = "rten")]
pub use rten_backend::RtenEngine;

use ndarray::{Array4, ArrayD};

use crate::error::InferenceError;

/// Raw tensors returned by the model for one frame.
#[derive(Debug, Clone)]
pub struct RawOutputs {
    /// `(candidates, 4)` as `x0, y0, x1, y1`, optionally with a batch axis.
    pub boxes: ArrayD<f32>,
    /// `(candidates, classes)`, optionally with a batch axis.
    pub scores: ArrayD<f32>,
}

impl RawOutputs {
    /// Pair up two model outputs whose order is not known.
    ///
    /// The tensor whose last axis is 4 is taken as boxes; if both or neither are,
    /// `first` is boxes (the usual export order).
    pub fn from_unordered(first: ArrayD<f32>, second: ArrayD<f32>) -> Self {
        let is_boxes = |t: &ArrayD<f32>| t.shape().last() == Some(&4);
        if !is_boxes(&first) && is_boxes(&second) {
            Self {
                boxes: second,
                scores: first,
            }
        } else {
            Self {
                boxes: first,
                scores: second,
            }
        }
    }
}

/// Anything that can turn a `(1, 3, h, w)` tensor into raw detections.
///
/// Implementations should not keep per-frame state between calls.
pub trait InferenceEngine: Send {
    fn name(&self) -> &str;

    fn infer(&mut self, input: &Array4<f32>) -> Result<RawOutputs, InferenceError>;

    /// Optional warm-up hook.
    fn warm_up(&mut self, input: &Array4<f32>) -> Result<(), InferenceError> {
        self.infer(input).map(|_| ())
    }
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Box<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<RawOutputs, InferenceError> {
        (**self).infer(input)
    }

    fn warm_up(&mut self, input: &Array4<f32>) -> Result<(), InferenceError> {
        (**self).warm_up(input)
    }
}
