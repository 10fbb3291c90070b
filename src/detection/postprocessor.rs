use crate::detection::metadata::MetadataStack;
use crate::detection::steps::Step;
use crate::error::GeometryError;
use crate::models::{BBox, Candidate};

/// Maps processed-image boxes back to original-image coordinates.
#[derive(Debug, Clone)]
pub struct PostProcessor {
    steps: Vec<Step>,
}

impl PostProcessor {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// Undo every step, last to first. The result is not clamped to the image.
    pub fn recover(&self, candidates: Vec<Candidate>, metadata: &MetadataStack) -> Result<Vec<Candidate>, GeometryError> {
        recover(candidates, &self.steps, metadata)
    }
}

/// Invert a single box through `steps` using the metadata recorded for them.
pub fn recover_box(bbox: BBox, steps: &[Step], metadata: &MetadataStack) -> Result<BBox, GeometryError> {
    check_alignment(steps, metadata)?;
    invert(bbox, steps, metadata)
}

pub fn recover(
    mut candidates: Vec<Candidate>,
    steps: &[Step],
    metadata: &MetadataStack,
) -> Result<Vec<Candidate>, GeometryError> {
    check_alignment(steps, metadata)?;
    for candidate in candidates.iter_mut() {
        candidate.bbox = invert(candidate.bbox, steps, metadata)?;
    }
    Ok(candidates)
}

fn check_alignment(steps: &[Step], metadata: &MetadataStack) -> Result<(), GeometryError> {
    if steps.len() != metadata.len() {
        return Err(GeometryError::StackLength {
            steps: steps.len(),
            metadata: metadata.len(),
        });
    }
    Ok(())
}

fn invert(mut bbox: BBox, steps: &[Step], metadata: &MetadataStack) -> Result<BBox, GeometryError> {
    for (index, (step, meta)) in steps.iter().zip(metadata.iter()).enumerate().rev() {
        bbox = step.inverse(bbox, meta, index)?;
    }
    Ok(bbox)
}
