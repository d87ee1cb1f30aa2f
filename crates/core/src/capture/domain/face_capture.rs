use std::io::Cursor;

use image::{ImageFormat, RgbImage};

use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// One accepted face of a round.
///
/// `index` is the player slot, assigned in detection order.
#[derive(Clone, Debug)]
pub struct FaceCapture {
    pub index: usize,
    pub image: Frame,
    pub bounding_box: Region,
    pub confidence: f64,
    /// Filled in by the quality gate.
    pub sharpness: Option<f64>,
}

impl FaceCapture {
    pub fn to_rgb_image(&self) -> Result<RgbImage, Box<dyn std::error::Error>> {
        frame_to_rgb_image(&self.image)
    }

    /// JPEG encoding of the crop, as sent to the backend and written to handoff files.
    pub fn jpeg_bytes(&self) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
        let img = self.to_rgb_image()?;
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Jpeg)?;
        Ok(buf.into_inner())
    }
}

pub fn frame_to_rgb_image(frame: &Frame) -> Result<RgbImage, Box<dyn std::error::Error>> {
    if frame.channels() != 3 {
        return Err(format!("expected an RGB frame, got {} channels", frame.channels()).into());
    }
    RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
        .ok_or_else(|| "frame buffer does not match its dimensions".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(width: u32, height: u32, channels: u8) -> FaceCapture {
        let data = vec![200u8; (width * height * channels as u32) as usize];
        FaceCapture {
            index: 0,
            image: Frame::new(data, width, height, channels, 0),
            bounding_box: Region::new(0, 0, width as i32, height as i32),
            confidence: 0.9,
            sharpness: None,
        }
    }

    #[test]
    fn test_jpeg_bytes_decode_to_same_size() {
        let bytes = capture(32, 24, 3).jpeg_bytes().unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.width(), 32);
        assert_eq!(decoded.height(), 24);
    }

    #[test]
    fn test_non_rgb_frame_is_rejected() {
        assert!(capture(4, 4, 1).jpeg_bytes().is_err());
    }
}
