use std::path::Path;

use ndarray::{Array4, ArrayD, IxDyn};
use rten::{Model, NodeId, Value};
use rten_tensor::prelude::*;
use rten_tensor::{NdTensor, Tensor};

use super::{InferenceEngine, RawOutputs};
use crate::error::InferenceError;

/// Runs a model file with the `rten` runtime.
pub struct RtenEngine {
    model: Model,
    input_id: NodeId,
    output_ids: Vec<NodeId>,
}

impl RtenEngine {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        let model = Model::load_file(path)
            .map_err(|e| InferenceError::Load(format!("{}: {}", path.display(), e)))?;

        let input_id = *model
            .input_ids()
            .first()
            .ok_or_else(|| InferenceError::Load("model declares no inputs".to_string()))?;
        let output_ids = model.output_ids().to_vec();
        if output_ids.len() < 2 {
            return Err(InferenceError::Outputs(output_ids.len()));
        }

        Ok(Self {
            model,
            input_id,
            output_ids,
        })
    }
}

fn to_array(value: Value) -> Result<ArrayD<f32>, InferenceError> {
    let tensor: Tensor<f32> = value
        .try_into()
        .map_err(|_| InferenceError::Run("model output is not f32".to_string()))?;
    let shape = tensor.shape().to_vec();
    ArrayD::from_shape_vec(IxDyn(&shape), tensor.to_vec()).map_err(|e| InferenceError::Run(e.to_string()))
}

impl InferenceEngine for RtenEngine {
    fn name(&self) -> &str {
        "rten"
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<RawOutputs, InferenceError> {
        let (n, c, h, w) = input.dim();
        let data: Vec<f32> = input.iter().copied().collect();
        let tensor = NdTensor::from_data([n, c, h, w], data);

        let mut outputs = self
            .model
            .run(
                vec![(self.input_id, tensor.view().into())],
                &self.output_ids[..2],
                None,
            )
            .map_err(|e| InferenceError::Run(e.to_string()))?;

        if outputs.len() != 2 {
            return Err(InferenceError::Outputs(outputs.len()));
        }
        let second = to_array(outputs.remove(1))?;
        let first = to_array(outputs.remove(0))?;
        Ok(RawOutputs::from_unordered(first, second))
    }
}
