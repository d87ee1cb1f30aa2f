use ndarray::Array2;

use crate::shared::frame::Frame;

/// Sharpness score: population variance of the 3×3 Laplacian response
/// `[0, 1, 0; 1, -4, 1; 0, 1, 0]` over the grayscale image.
///
/// Borders are mirrored around the edge pixel (`at(-1) == at(1)`), OpenCV's
/// default. Higher means sharper; a flat image scores 0.
pub fn laplacian_variance(frame: &Frame) -> f64 {
    if frame.is_empty() {
        return 0.0;
    }
    let gray = to_gray(frame);
    let (h, w) = gray.dim();

    let at = |y: isize, x: isize| -> f64 { gray[[reflect_101(y, h), reflect_101(x, w)]] };

    let n = (w * h) as f64;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for y in 0..h as isize {
        for x in 0..w as isize {
            let lap = at(y - 1, x) + at(y + 1, x) + at(y, x - 1) + at(y, x + 1) - 4.0 * at(y, x);
            sum += lap;
            sum_sq += lap * lap;
        }
    }
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

/// Maps an index at most one step outside `0..len` back inside, mirroring
/// without repeating the edge.
fn reflect_101(i: isize, len: usize) -> usize {
    let last = len as isize - 1;
    if last == 0 {
        return 0;
    }
    let i = if i < 0 { -i } else { i };
    (if i > last { 2 * last - i } else { i }) as usize
}

/// ITU-R BT.601 luma, rounded to whole grey levels like an 8-bit conversion.
fn to_gray(frame: &Frame) -> Array2<f64> {
    let pixels = frame.as_ndarray();
    let (h, w) = (frame.height() as usize, frame.width() as usize);
    if frame.channels() < 3 {
        return Array2::from_shape_fn((h, w), |(y, x)| pixels[[y, x, 0]] as f64);
    }
    Array2::from_shape_fn((h, w), |(y, x)| {
        let r = pixels[[y, x, 0]] as f64;
        let g = pixels[[y, x, 1]] as f64;
        let b = pixels[[y, x, 2]] as f64;
        (0.299 * r + 0.587 * g + 0.114 * b).round()
    })
}
