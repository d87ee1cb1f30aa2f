use crate::capture::domain::face_capture::FaceCapture;

/// A quality-checked round handed from capture to generation.
#[derive(Clone, Debug)]
pub struct GenerationJob {
    pub round: u64,
    /// In index order.
    pub faces: Vec<FaceCapture>,
}
