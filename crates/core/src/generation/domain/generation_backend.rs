use crate::capture::domain::face_capture::FaceCapture;
use crate::generation::domain::prompt::PromptStyle;

/// One call to the image-generation backend.
pub struct GenerationRequest<'a> {
    pub face: &'a FaceCapture,
    pub style: &'a PromptStyle,
    /// `style.template` with the face description filled in.
    pub prompt: String,
}

/// Result of a single generation attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// Locations (URLs or paths) of the produced images.
    Success(Vec<String>),
    /// Worth another attempt: rate limits, timeouts, failed predictions.
    RetryableFailure(String),
    /// Retrying cannot help: bad credentials, rejected input.
    FatalFailure(String),
}

/// Domain interface for the external generation service.
pub trait GenerationBackend: Send {
    fn generate(&mut self, request: &GenerationRequest<'_>) -> GenerationOutcome;
}
