use crate::capture::domain::face_capture::FaceCapture;

/// Domain interface for turning a face crop into a short text description.
pub trait FaceDescriber: Send {
    fn describe(&mut self, face: &FaceCapture) -> Result<String, Box<dyn std::error::Error>>;
}

/// Answers from a visual question-answering model about one face.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FaceAttributes {
    pub person: String,
    pub glasses: bool,
    pub hair: String,
    pub eyes: String,
}

/// `"<person>[ with glasses] with <hair> and <eyes> eyes"`.
///
/// Glasses are only added when the person answer does not mention them
/// already. Missing answers fall back to neutral words.
pub fn compose_description(attrs: &FaceAttributes) -> String {
    let answer_or = |s: &str, fallback: &str| {
        let s = s.trim();
        if s.is_empty() {
            fallback.to_string()
        } else {
            s.to_string()
        }
    };
    let person = answer_or(&attrs.person, "person");
    let hair = answer_or(&attrs.hair, "hair");
    let eyes = answer_or(&attrs.eyes, "dark");

    let glasses = if attrs.glasses && !person.to_ascii_lowercase().contains("glasses") {
        " with glasses"
    } else {
        ""
    };
    format!("{person}{glasses} with {hair} and {eyes} eyes")
}

/// Interprets a free-text yes/no answer.
pub fn is_affirmative(answer: &str) -> bool {
    let answer = answer.trim().to_ascii_lowercase();
    answer == "yes" || answer.starts_with("yes ") || answer.starts_with("yes,")
}
