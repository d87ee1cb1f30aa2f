use std::path::PathBuf;

/// Persists one generated image.
pub trait ResultStore: Send {
    /// Stores the image at `location` and returns every file written.
    fn store(
        &mut self,
        location: &str,
        style: &str,
        face_index: usize,
    ) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>>;
}
