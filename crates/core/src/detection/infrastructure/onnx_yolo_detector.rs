/// YOLO face detector using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference and decoding of the raw output
/// rows back into frame coordinates. Thresholding and suppression are left
/// to the domain's `DetectionFilter`.
use std::path::Path;

use crate::detection::domain::detection::Detection;
use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

use super::execution_provider::preferred_execution_providers;

/// Fallback YOLO model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Rows scoring below this are never emitted; keeps the candidate list short.
const SCORE_FLOOR: f64 = 0.05;

/// YOLO face detector backed by an ONNX Runtime session.
pub struct OnnxYoloDetector {
    session: ort::session::Session,
    input_size: u32,
}

impl OnnxYoloDetector {
    /// Load a YOLO ONNX model and prepare for inference.
    ///
    /// The input resolution is read from the model's input shape (expecting NCHW).
    /// Falls back to 640 if the shape is dynamic or unreadable.
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?
            .with_execution_providers(preferred_execution_providers())?
            .commit_from_file(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| match input.dtype() {
                ort::value::ValueType::Tensor { shape, .. }
                    if shape.len() >= 4 && shape[2] > 0 =>
                {
                    Some(shape[2] as u32)
                }
                _ => None,
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        log::debug!("YOLO face model loaded, input size {input_size}");
        Ok(Self {
            session,
            input_size,
        })
    }
}

impl FaceDetector for OnnxYoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
        if frame.is_empty() || frame.channels() < 3 {
            return Err("face detection needs a non-empty RGB frame".into());
        }

        let letterboxed = letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(letterboxed.tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();
        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;

        decode_rows(data, &shape, letterboxed.scale, letterboxed.pad_x, letterboxed.pad_y)
    }
}

/// Letterboxed model input plus the transform needed to map boxes back.
struct Letterboxed {
    tensor: ndarray::Array4<f32>,
    scale: f64,
    pad_x: u32,
    pad_y: u32,
}

/// Letterbox-resize a frame to `target_size` × `target_size`.
fn letterbox(frame: &Frame, target_size: u32) -> Letterboxed {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // 114/255 gray padding, YOLO convention
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    // Nearest-neighbour resize into the padded area
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    Letterboxed {
        tensor,
        scale,
        pad_x,
        pad_y,
    }
}

/// Decodes `[1, features, detections]` or `[1, detections, features]` output.
///
/// Each row starts with `[cx, cy, w, h, conf, ...]` in letterbox pixels;
/// trailing keypoint values are ignored.
fn decode_rows(
    data: &[f32],
    shape: &[usize],
    scale: f64,
    pad_x: u32,
    pad_y: u32,
) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
    if shape.len() != 3 {
        return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
    }
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats < 5 {
        return Ok(Vec::new());
    }

    let value = |det: usize, feat: usize| -> f64 {
        let idx = if transposed {
            feat * num_dets + det
        } else {
            det * num_feats + feat
        };
        data[idx] as f64
    };

    let mut detections = Vec::new();
    for i in 0..num_dets {
        let conf = value(i, 4);
        if conf < SCORE_FLOOR {
            continue;
        }
        let (cx, cy, w, h) = (value(i, 0), value(i, 1), value(i, 2), value(i, 3));
        let to_frame_x = |v: f64| (v - pad_x as f64) / scale;
        let to_frame_y = |v: f64| (v - pad_y as f64) / scale;

        let region = Region::from_corners(
            to_frame_x(cx - w / 2.0),
            to_frame_y(cy - h / 2.0),
            to_frame_x(cx + w / 2.0),
            to_frame_y(cy + h / 2.0),
        );
        detections.push(Detection::new(region, conf));
    }
    Ok(detections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_letterbox_preserves_aspect_ratio() {
        // scale = min(640/200, 640/100) = 3.2 → 640x320, pad_y = 160
        let frame = Frame::new(vec![128u8; 200 * 100 * 3], 200, 100, 3, 0);
        let lb = letterbox(&frame, 640);

        assert_eq!(lb.tensor.shape(), &[1, 3, 640, 640]);
        assert_relative_eq!(lb.scale, 3.2, epsilon = 0.01);
        assert_eq!(lb.pad_x, 0);
        assert_eq!(lb.pad_y, 160);
    }

    #[test]
    fn test_letterbox_values_normalized() {
        let frame = Frame::new(vec![255u8; 100 * 50 * 3], 100, 50, 3, 0);
        let lb = letterbox(&frame, 640);

        let y = lb.pad_y as usize + 1;
        assert_relative_eq!(lb.tensor[[0, 0, y, 1]], 1.0, epsilon = 0.01);
        assert_relative_eq!(lb.tensor[[0, 0, 0, 0]], 114.0 / 255.0, epsilon = 0.01);
    }

    #[test]
    fn test_decode_row_major_maps_back_to_frame() {
        // one detection, 5 features: centre (320, 320), 64x64, conf 0.9
        let data = [320.0, 320.0, 64.0, 64.0, 0.9];
        let dets = decode_rows(&data, &[1, 1, 5], 2.0, 0, 80).unwrap();

        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].region, Region::new(144, 104, 32, 32));
        assert_relative_eq!(dets[0].confidence, 0.9, epsilon = 1e-6);
    }

    #[test]
    fn test_decode_transposed_layout() {
        // 5 features x 6 detections, only detection 2 is scored
        let num_dets = 6;
        let mut data = vec![0.0f32; 5 * num_dets];
        let set = |d: &mut Vec<f32>, feat: usize, val: f32| d[feat * num_dets + 2] = val;
        set(&mut data, 0, 50.0);
        set(&mut data, 1, 60.0);
        set(&mut data, 2, 20.0);
        set(&mut data, 3, 10.0);
        set(&mut data, 4, 0.7);

        let dets = decode_rows(&data, &[1, 5, num_dets], 1.0, 0, 0).unwrap();

        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].region, Region::new(40, 55, 20, 10));
    }

    #[test]
    fn test_decode_drops_rows_below_floor() {
        let data = [10.0, 10.0, 4.0, 4.0, 0.01];
        assert!(decode_rows(&data, &[1, 1, 5], 1.0, 0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_decode_rejects_unexpected_rank() {
        assert!(decode_rows(&[0.0; 5], &[5], 1.0, 0, 0).is_err());
    }
}
