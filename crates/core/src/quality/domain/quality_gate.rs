use thiserror::Error;

use crate::capture::domain::capture_session::CaptureSession;
use crate::quality::domain::sharpness::laplacian_variance;
use crate::shared::constants::DEFAULT_BLUR_THRESHOLD;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QualityVerdict {
    AllClear,
    /// First blurry face found; the session has been emptied.
    Blurry { index: usize, score: f64 },
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("quality gate needs {target} faces, session has {have}")]
pub struct IncompleteSession {
    pub have: usize,
    pub target: u32,
}

/// Accept/reject check over a complete session.
///
/// A face is blurry when its score is at or below `threshold`. One blurry
/// face rejects the whole set so player slots stay aligned.
#[derive(Clone, Debug)]
pub struct QualityGate {
    threshold: f64,
}

impl QualityGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_blurry(&self, score: f64) -> bool {
        score <= self.threshold
    }

    /// Scores every face, storing the result in `FaceCapture::sharpness`.
    pub fn evaluate(&self, session: &mut CaptureSession) -> Result<QualityVerdict, IncompleteSession> {
        if session.len() != session.target_count() as usize {
            return Err(IncompleteSession {
                have: session.len(),
                target: session.target_count(),
            });
        }

        let mut first_blurry = None;
        for face in session.faces_mut() {
            let score = laplacian_variance(&face.image);
            face.sharpness = Some(score);
            log::debug!("Face {} sharpness {score:.1}", face.index);
            if first_blurry.is_none() && self.is_blurry(score) {
                first_blurry = Some((face.index, score));
            }
        }

        match first_blurry {
            Some((index, score)) => {
                log::info!(
                    "Face {index} is blurry ({score:.1} <= {:.1}); discarding session",
                    self.threshold
                );
                session.clear();
                Ok(QualityVerdict::Blurry { index, score })
            }
            None => Ok(QualityVerdict::AllClear),
        }
    }
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(DEFAULT_BLUR_THRESHOLD)
    }
}
