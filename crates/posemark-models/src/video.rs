//! Video metadata and crop bounds.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// File extensions accepted as video uploads.
pub const VIDEO_EXTENSIONS: [&str; 8] = ["mp4", "webm", "ogg", "avi", "mov", "wmv", "mkv", "m4v"];

/// Whether a file name carries one of the accepted video extensions.
pub fn is_video_file(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| {
            let ext = ext.to_ascii_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Metadata of the loaded video.
///
/// `width`/`height` describe the displayed raster. When black borders were
/// cropped away, `original_width`/`original_height` keep the pre-crop size,
/// which is the coordinate space every stored position lives in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    /// Duration in seconds
    pub duration: f64,
    pub frame_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_height: Option<u32>,
}

impl VideoInfo {
    pub fn new(width: u32, height: u32, duration: f64, frame_rate: f64) -> Self {
        Self {
            width,
            height,
            duration,
            frame_rate,
            original_width: None,
            original_height: None,
        }
    }

    /// Number of addressable frames: `floor(duration * frame_rate)`.
    pub fn total_frames(&self) -> u64 {
        let frames = (self.duration * self.frame_rate).floor();
        if frames.is_finite() && frames > 0.0 {
            frames as u64
        } else {
            0
        }
    }

    /// Presentation time of a frame, in seconds.
    pub fn frame_time(&self, frame: u64) -> f64 {
        frame as f64 / self.frame_rate
    }

    /// Size of the uncropped video.
    pub fn original_dimensions(&self) -> (u32, u32) {
        (
            self.original_width.unwrap_or(self.width),
            self.original_height.unwrap_or(self.height),
        )
    }

    pub fn is_cropped(&self) -> bool {
        self.original_width.is_some() || self.original_height.is_some()
    }

    /// Copy describing the video after cropping to `bounds`.
    pub fn with_crop(&self, bounds: &CropBounds) -> Self {
        let (original_width, original_height) = self.original_dimensions();
        Self {
            width: bounds.width,
            height: bounds.height,
            duration: self.duration,
            frame_rate: self.frame_rate,
            original_width: Some(original_width),
            original_height: Some(original_height),
        }
    }
}

/// Content rectangle in original pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CropBounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropBounds {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Bounds covering a whole `width` x `height` raster.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Whether these bounds cover the whole `width` x `height` raster.
    pub fn is_full(&self, width: u32, height: u32) -> bool {
        *self == Self::full(width, height)
    }

    /// Whether the rectangle is non-empty and lies inside `width` x `height`.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.checked_add(self.width).is_some_and(|r| r <= width)
            && self.y.checked_add(self.height).is_some_and(|b| b <= height)
    }
}
