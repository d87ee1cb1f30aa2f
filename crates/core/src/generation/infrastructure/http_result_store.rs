use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use image::{imageops, DynamicImage, RgbaImage};

use crate::generation::domain::result_store::ResultStore;

/// Saves generated images as PNG files under `output_dir`.
///
/// `http(s)://` locations are downloaded; anything else is read as a local
/// path. File names are `<style>_<index>_<timestamp>.png`. With an overlay
/// configured, a second `<style>_framed_<index>_<timestamp>.png` is written
/// with the overlay composited on top.
pub struct HttpResultStore {
    http: reqwest::blocking::Client,
    output_dir: PathBuf,
    overlay: Option<RgbaImage>,
}

impl HttpResultStore {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        overlay_path: Option<&Path>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)?;
        let overlay = match overlay_path {
            Some(path) => Some(
                image::open(path)
                    .map_err(|e| format!("cannot load overlay {}: {e}", path.display()))?
                    .to_rgba8(),
            ),
            None => None,
        };
        Ok(Self {
            http: reqwest::blocking::Client::new(),
            output_dir,
            overlay,
        })
    }

    fn fetch(&self, location: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        if location.starts_with("http://") || location.starts_with("https://") {
            let response = self.http.get(location).send()?.error_for_status()?;
            Ok(response.bytes()?.to_vec())
        } else {
            Ok(fs::read(location)?)
        }
    }
}

fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Composites `overlay` over `background`, stretched to the background size.
fn apply_overlay(background: &DynamicImage, overlay: &RgbaImage) -> RgbaImage {
    let mut canvas = background.to_rgba8();
    let (w, h) = canvas.dimensions();
    if overlay.dimensions() == (w, h) {
        imageops::overlay(&mut canvas, overlay, 0, 0);
    } else {
        let scaled = imageops::resize(overlay, w, h, imageops::FilterType::Triangle);
        imageops::overlay(&mut canvas, &scaled, 0, 0);
    }
    canvas
}

impl ResultStore for HttpResultStore {
    fn store(
        &mut self,
        location: &str,
        style: &str,
        face_index: usize,
    ) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
        let bytes = self.fetch(location)?;
        let img = image::load_from_memory(&bytes)?;
        let stamp = timestamp();

        let plain = self
            .output_dir
            .join(format!("{style}_{face_index}_{stamp}.png"));
        img.save(&plain)?;
        log::info!("Saved {}", plain.display());
        let mut written = vec![plain];

        if let Some(overlay) = &self.overlay {
            let framed = self
                .output_dir
                .join(format!("{style}_framed_{face_index}_{stamp}.png"));
            apply_overlay(&img, overlay).save(&framed)?;
            log::info!("Saved {}", framed.display());
            written.push(framed);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba};
    use tempfile::TempDir;

    fn write_source(dir: &Path) -> PathBuf {
        let path = dir.join("generated.png");
        RgbImage::from_pixel(8, 8, Rgb([10, 20, 30])).save(&path).unwrap();
        path
    }

    #[test]
    fn test_store_local_file_as_png() {
        let tmp = TempDir::new().unwrap();
        let source = write_source(tmp.path());
        let out_dir = tmp.path().join("pictures");
        let mut store = HttpResultStore::new(&out_dir, None).unwrap();

        let written = store.store(source.to_str().unwrap(), "epic", 1).unwrap();

        assert_eq!(written.len(), 1);
        let name = written[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("epic_1_"));
        assert!(name.ends_with(".png"));
        assert_eq!(image::open(&written[0]).unwrap().width(), 8);
    }

    #[test]
    fn test_overlay_writes_framed_copy() {
        let tmp = TempDir::new().unwrap();
        let source = write_source(tmp.path());
        let overlay_path = tmp.path().join("frame.png");
        let mut frame = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0]));
        frame.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        frame.save(&overlay_path).unwrap();

        let mut store = HttpResultStore::new(tmp.path().join("out"), Some(&overlay_path)).unwrap();
        let written = store.store(source.to_str().unwrap(), "sketch", 0).unwrap();

        assert_eq!(written.len(), 2);
        assert!(written[1]
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("sketch_framed_0_"));
        let framed = image::open(&written[1]).unwrap().to_rgba8();
        assert_eq!(framed.dimensions(), (8, 8));
        assert_eq!(framed.get_pixel(7, 7).0, [10, 20, 30, 255]);
    }

    #[test]
    fn test_missing_overlay_fails_construction() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope.png");
        assert!(HttpResultStore::new(tmp.path(), Some(&missing)).is_err());
    }

    #[test]
    fn test_missing_source_is_error() {
        let tmp = TempDir::new().unwrap();
        let mut store = HttpResultStore::new(tmp.path(), None).unwrap();
        assert!(store.store("/nonexistent/out.png", "epic", 0).is_err());
    }
}
