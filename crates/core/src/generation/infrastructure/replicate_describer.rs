use serde_json::json;

use crate::capture::domain::face_capture::FaceCapture;
use crate::generation::domain::face_describer::{
    compose_description, is_affirmative, FaceAttributes, FaceDescriber,
};

use super::replicate_client::ReplicateClient;

const PERSON_QUESTION: &str = "what kind of person is in the picture";
const GLASSES_QUESTION: &str = "does this person wear glasses, yes or no";
const HAIR_QUESTION: &str = "what is this persons hair color and length";
const EYES_QUESTION: &str = "What is this persons eye color";

/// Describes a face by asking a visual question-answering model four questions.
pub struct ReplicateDescriber {
    client: ReplicateClient,
    model_version: String,
}

impl ReplicateDescriber {
    pub fn new(client: ReplicateClient, model_version: impl Into<String>) -> Self {
        Self {
            client,
            model_version: model_version.into(),
        }
    }

    fn ask(&self, image_url: &str, question: &str) -> Result<String, Box<dyn std::error::Error>> {
        let input = json!({
            "image": image_url,
            "caption": false,
            "context": "there is one person",
            "question": question,
            "temperature": 1,
            "use_nucleus_sampling": false,
        });
        let prediction = self.client.predict(&self.model_version, input)?;
        let answer = prediction.output_strings().join(" ");
        log::debug!("{question:?} -> {answer:?}");
        Ok(answer)
    }
}

impl FaceDescriber for ReplicateDescriber {
    fn describe(&mut self, face: &FaceCapture) -> Result<String, Box<dyn std::error::Error>> {
        let image_url = self.client.upload(
            face.jpeg_bytes()?,
            &format!("face_{}.jpg", face.index),
            "image/jpeg",
        )?;

        let attrs = FaceAttributes {
            person: self.ask(&image_url, PERSON_QUESTION)?,
            glasses: is_affirmative(&self.ask(&image_url, GLASSES_QUESTION)?),
            hair: self.ask(&image_url, HAIR_QUESTION)?,
            eyes: self.ask(&image_url, EYES_QUESTION)?,
        };
        Ok(compose_description(&attrs))
    }
}
