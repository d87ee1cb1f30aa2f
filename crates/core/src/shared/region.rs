/// Overlap above which two detections count as the same face.
pub const DEFAULT_IOU_THRESHOLD: f64 = 0.4;

/// Axis-aligned bounding box in frame pixel coordinates: `(x, y, w, h)`.
///
/// Coordinates may lie outside the frame until [`Region::clamp_to`] is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a region from floating-point corners `(x1, y1)`-`(x2, y2)`.
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let x = x1.round() as i32;
        let y = y1.round() as i32;
        Self {
            x,
            y,
            width: (x2.round() as i32 - x).max(0),
            height: (y2.round() as i32 - y).max(0),
        }
    }

    pub fn area(&self) -> i64 {
        self.width.max(0) as i64 * self.height.max(0) as i64
    }

    pub fn iou(&self, other: &Region) -> f64 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = (self.x + self.width).min(other.x + other.width);
        let iy2 = (self.y + self.height).min(other.y + other.height);

        let inter = (ix2 - ix1).max(0) as f64 * (iy2 - iy1).max(0) as f64;
        if inter == 0.0 {
            return 0.0;
        }

        let union = self.area() as f64 + other.area() as f64 - inter;
        inter / union
    }

    /// Intersection with the `frame_w` x `frame_h` frame rectangle.
    pub fn clamp_to(&self, frame_w: u32, frame_h: u32) -> Region {
        let fw = frame_w as i32;
        let fh = frame_h as i32;
        let x1 = self.x.clamp(0, fw);
        let y1 = self.y.clamp(0, fh);
        let x2 = (self.x + self.width).clamp(0, fw);
        let y2 = (self.y + self.height).clamp(0, fh);
        Region::new(x1, y1, (x2 - x1).max(0), (y2 - y1).max(0))
    }

    /// Grows the box by `padding` pixels on every side, then clamps it.
    pub fn padded(&self, padding: i32, frame_w: u32, frame_h: u32) -> Region {
        Region::new(
            self.x - padding,
            self.y - padding,
            self.width + 2 * padding,
            self.height + 2 * padding,
        )
        .clamp_to(frame_w, frame_h)
    }
}
