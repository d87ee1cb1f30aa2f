use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde_json::json;

use crate::capture::domain::face_capture::FaceCapture;
use crate::generation::domain::generation_backend::{
    GenerationBackend, GenerationOutcome, GenerationRequest,
};

use super::replicate_client::{BackendError, ReplicateClient};

/// Caches the uploaded URL of the most recent face, so generating several
/// styles of one face uploads it once.
#[derive(Default)]
struct UploadCache {
    key: Option<u64>,
    url: String,
}

/// Image-to-image generation through a Replicate-style prediction API.
pub struct ReplicateBackend {
    client: ReplicateClient,
    uploads: UploadCache,
}

impl ReplicateBackend {
    pub fn new(client: ReplicateClient) -> Self {
        Self {
            client,
            uploads: UploadCache::default(),
        }
    }

    fn upload_face(&mut self, face: &FaceCapture) -> Result<String, GenerationOutcome> {
        let jpeg = face
            .jpeg_bytes()
            .map_err(|e| GenerationOutcome::FatalFailure(format!("cannot encode face: {e}")))?;

        let mut hasher = DefaultHasher::new();
        jpeg.hash(&mut hasher);
        let key = hasher.finish();
        if self.uploads.key == Some(key) {
            return Ok(self.uploads.url.clone());
        }

        let url = self
            .client
            .upload(jpeg, &format!("face_{}.jpg", face.index), "image/jpeg")
            .map_err(classify)?;
        self.uploads = UploadCache {
            key: Some(key),
            url: url.clone(),
        };
        Ok(url)
    }
}

fn classify(err: BackendError) -> GenerationOutcome {
    if err.is_retryable() {
        GenerationOutcome::RetryableFailure(err.to_string())
    } else {
        GenerationOutcome::FatalFailure(err.to_string())
    }
}

impl GenerationBackend for ReplicateBackend {
    fn generate(&mut self, request: &GenerationRequest<'_>) -> GenerationOutcome {
        let image_url = match self.upload_face(request.face) {
            Ok(url) => url,
            Err(outcome) => return outcome,
        };

        let style = request.style;
        let input = json!({
            "prompt": request.prompt,
            "input_image": image_url,
            "style_name": style.style_name,
            "guidance_scale": style.guidance_scale,
            "negative_prompt": style.negative_prompt,
            "style_strength_ratio": style.style_strength_ratio,
            "num_steps": style.num_steps,
            "num_outputs": 1,
        });

        match self.client.predict(&style.model_version, input) {
            Ok(prediction) => {
                let outputs = prediction.output_strings();
                if outputs.is_empty() {
                    GenerationOutcome::RetryableFailure(format!(
                        "prediction {} returned no images",
                        prediction.id
                    ))
                } else {
                    GenerationOutcome::Success(outputs)
                }
            }
            Err(e) => classify(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_maps_retryable_errors() {
        let rate_limited = BackendError::Status {
            code: 429,
            body: "slow down".into(),
        };
        assert!(matches!(
            classify(rate_limited),
            GenerationOutcome::RetryableFailure(_)
        ));
        assert!(matches!(
            classify(BackendError::MissingToken),
            GenerationOutcome::FatalFailure(_)
        ));
    }
}
