//! Letterbox / pillarbox border detection.
//!
//! Sampling is sparse: each row is tested on columns spread over the middle
//! 80% of the width (and each column on rows over the middle 80% of the
//! height), stepping `sample_step` pixels.

use image::RgbImage;
use posemark_models::CropBounds;
use tracing::debug;

/// Tunable border-detection parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BorderDetection {
    /// A pixel is dark when every channel is at or below this value
    pub threshold: u8,
    /// A row/column is border while at least this fraction of samples is dark
    pub dark_ratio: f64,
    /// Distance between sample points, in pixels
    pub sample_step: u32,
    /// Minimum width or height reduction for the crop to be applied
    pub min_reduction: f64,
}

impl Default for BorderDetection {
    fn default() -> Self {
        Self {
            threshold: 20,
            dark_ratio: 0.9,
            sample_step: 10,
            min_reduction: 0.05,
        }
    }
}

impl BorderDetection {
    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }
}

/// Find the non-border content rectangle of `image`.
///
/// Returns the full image bounds unless the detected content is narrower or
/// shorter than the image by more than `min_reduction`.
pub fn detect_borders(image: &RgbImage, params: &BorderDetection) -> CropBounds {
    let (width, height) = image.dimensions();
    let full = CropBounds::full(width, height);
    if width == 0 || height == 0 {
        return full;
    }

    let xs = sample_positions(width, params.sample_step);
    let ys = sample_positions(height, params.sample_step);

    let is_dark = |x: u32, y: u32| {
        image
            .get_pixel(x, y)
            .0
            .iter()
            .all(|&c| c <= params.threshold)
    };
    let mostly_dark = |dark: usize, total: usize| dark as f64 >= total as f64 * params.dark_ratio;

    let row_is_border = |y: u32| mostly_dark(xs.iter().filter(|&&x| is_dark(x, y)).count(), xs.len());
    let col_is_border = |x: u32| mostly_dark(ys.iter().filter(|&&y| is_dark(x, y)).count(), ys.len());

    let Some(top) = (0..height).find(|&y| !row_is_border(y)) else {
        // Entirely dark frame: nothing to crop against
        return full;
    };
    let bottom = (0..height).rev().find(|&y| !row_is_border(y)).unwrap_or(top) + 1;
    let left = (0..width).find(|&x| !col_is_border(x)).unwrap_or(0);
    let right = (0..width)
        .rev()
        .find(|&x| !col_is_border(x))
        .map(|x| x + 1)
        .unwrap_or(width);

    if right <= left || bottom <= top {
        return full;
    }

    let content = CropBounds::new(left, top, right - left, bottom - top);
    let width_reduction = 1.0 - content.width as f64 / width as f64;
    let height_reduction = 1.0 - content.height as f64 / height as f64;

    debug!(
        top,
        bottom,
        left,
        right,
        width_reduction,
        height_reduction,
        "Border scan complete"
    );

    if width_reduction > params.min_reduction || height_reduction > params.min_reduction {
        content
    } else {
        full
    }
}

fn sample_positions(len: u32, step: u32) -> Vec<u32> {
    let start = (len as f64 * 0.1).floor() as u32;
    let end = (len as f64 * 0.9).ceil() as u32;
    let positions: Vec<u32> = (start..end.min(len)).step_by(step.max(1) as usize).collect();
    if positions.is_empty() {
        vec![len / 2]
    } else {
        positions
    }
}
