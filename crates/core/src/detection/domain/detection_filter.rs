use crate::detection::domain::detection::Detection;
use crate::shared::constants::{DEFAULT_CONFIDENCE, DEFAULT_PADDING};
use crate::shared::region::DEFAULT_IOU_THRESHOLD;

/// Turns raw detector output into capture candidates.
///
/// Stages, in order:
/// 1. Drop detections scoring below `confidence_threshold`
/// 2. Grow each box by `padding` pixels and clamp it to the frame
/// 3. Greedy non-max suppression: the highest-confidence box of every
///    overlapping cluster survives
///
/// Output is sorted by descending confidence.
#[derive(Clone, Debug)]
pub struct DetectionFilter {
    confidence_threshold: f64,
    padding: i32,
    iou_threshold: f64,
}

impl DetectionFilter {
    pub fn new(confidence_threshold: f64, padding: i32, iou_threshold: f64) -> Self {
        Self {
            confidence_threshold,
            padding: padding.max(0),
            iou_threshold,
        }
    }

    pub fn apply(&self, detections: Vec<Detection>, frame_w: u32, frame_h: u32) -> Vec<Detection> {
        let mut candidates: Vec<Detection> = detections
            .into_iter()
            .filter(|d| d.confidence >= self.confidence_threshold)
            .map(|d| Detection {
                region: d.region.padded(self.padding, frame_w, frame_h),
                confidence: d.confidence,
            })
            .filter(|d| d.region.area() > 0)
            .collect();

        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        suppress(candidates, self.iou_threshold)
    }
}

impl Default for DetectionFilter {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE, DEFAULT_PADDING, DEFAULT_IOU_THRESHOLD)
    }
}

/// Expects `sorted` in descending confidence order.
fn suppress(sorted: Vec<Detection>, iou_threshold: f64) -> Vec<Detection> {
    let mut kept: Vec<Detection> = Vec::with_capacity(sorted.len());
    for det in sorted {
        let overlaps = kept
            .iter()
            .any(|k| k.region.iou(&det.region) > iou_threshold);
        if !overlaps {
            kept.push(det);
        }
    }
    kept
}
