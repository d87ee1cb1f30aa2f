use crate::detection::domain::detection::Detection;
use crate::shared::frame::Frame;

/// Domain interface for face detection.
///
/// Implementations may hold inference sessions or scratch buffers,
/// hence `&mut self`. Returned detections are unfiltered; thresholding,
/// padding and suppression belong to [`DetectionFilter`].
///
/// [`DetectionFilter`]: crate::detection::domain::detection_filter::DetectionFilter
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>>;
}
