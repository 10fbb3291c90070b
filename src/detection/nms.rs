//! Greedy, class-agnostic non-maximum suppression.

use crate::models::Candidate;

#[derive(Debug, Clone, Copy)]
pub struct Suppressor {
    score_thresh: f32,
    iou_thresh: f32,
    top_k: Option<usize>,
}

impl Suppressor {
    pub fn new(score_thresh: f32, iou_thresh: f32) -> Self {
        Self {
            score_thresh,
            iou_thresh,
            top_k: None,
        }
    }

    /// Keep at most `k` boxes.
    pub fn with_top_k(mut self, top_k: Option<usize>) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn select(&self, candidates: &[Candidate]) -> Vec<usize> {
        select(candidates, self.score_thresh, self.iou_thresh, self.top_k)
    }
}

/// Indices of the boxes that survive, highest score first.
///
/// A box is dropped when its IoU with an already kept box is strictly above
/// `iou_thresh`, whatever the two classes are. Equal scores keep input order.
pub fn select(candidates: &[Candidate], score_thresh: f32, iou_thresh: f32, top_k: Option<usize>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len())
        .filter(|&i| candidates[i].score >= score_thresh)
        .collect();
    order.sort_by(|&a, &b| candidates[b].score.total_cmp(&candidates[a].score));

    let limit = top_k.unwrap_or(usize::MAX);
    let mut keep: Vec<usize> = Vec::new();

    for index in order {
        if keep.len() >= limit {
            break;
        }
        let bbox = &candidates[index].bbox;
        let overlaps = keep
            .iter()
            .any(|&kept| candidates[kept].bbox.iou(bbox) > iou_thresh);
        if !overlaps {
            keep.push(index);
        }
    }

    log::debug!("nms kept {} of {} candidates", keep.len(), candidates.len());
    keep
}
