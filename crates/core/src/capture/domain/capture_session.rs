use crate::capture::domain::face_capture::FaceCapture;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Faces collected for one round, indexed `0..target_count` in capture order.
#[derive(Clone, Debug)]
pub struct CaptureSession {
    target_count: u32,
    faces: Vec<FaceCapture>,
}

impl CaptureSession {
    pub fn new(target_count: u32) -> Self {
        Self {
            target_count,
            faces: Vec::with_capacity(target_count as usize),
        }
    }

    pub fn target_count(&self) -> u32 {
        self.target_count
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn remaining(&self) -> usize {
        (self.target_count as usize).saturating_sub(self.faces.len())
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Appends a face under the next free index.
    ///
    /// Returns the index, or `None` when the session is already full.
    pub fn push(&mut self, image: Frame, bounding_box: Region, confidence: f64) -> Option<usize> {
        if self.is_complete() {
            return None;
        }
        let index = self.faces.len();
        self.faces.push(FaceCapture {
            index,
            image,
            bounding_box,
            confidence,
            sharpness: None,
        });
        Some(index)
    }

    pub fn faces(&self) -> &[FaceCapture] {
        &self.faces
    }

    pub fn faces_mut(&mut self) -> &mut [FaceCapture] {
        &mut self.faces
    }

    pub fn into_faces(self) -> Vec<FaceCapture> {
        self.faces
    }

    /// Drops every face; the target is kept.
    pub fn clear(&mut self) {
        self.faces.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crop() -> Frame {
        Frame::new(vec![0u8; 4 * 4 * 3], 4, 4, 3, 0)
    }

    #[test]
    fn test_indices_follow_insertion_order() {
        let mut session = CaptureSession::new(3);
        assert_eq!(session.push(crop(), Region::new(0, 0, 4, 4), 0.9), Some(0));
        assert_eq!(session.push(crop(), Region::new(9, 0, 4, 4), 0.8), Some(1));

        let indices: Vec<usize> = session.faces().iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(session.remaining(), 1);
        assert!(!session.is_complete());
    }

    #[test]
    fn test_full_session_rejects_extras() {
        let mut session = CaptureSession::new(1);
        session.push(crop(), Region::new(0, 0, 4, 4), 0.9);
        assert!(session.is_complete());
        assert_eq!(session.push(crop(), Region::new(0, 0, 4, 4), 0.99), None);
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn test_clear_keeps_target() {
        let mut session = CaptureSession::new(2);
        session.push(crop(), Region::new(0, 0, 4, 4), 0.9);
        session.clear();
        assert!(session.is_empty());
        assert_eq!(session.target_count(), 2);
        assert_eq!(session.push(crop(), Region::new(0, 0, 4, 4), 0.9), Some(0));
    }

    #[test]
    fn test_zero_target_is_immediately_complete() {
        let session = CaptureSession::new(0);
        assert!(session.is_complete());
    }
}
