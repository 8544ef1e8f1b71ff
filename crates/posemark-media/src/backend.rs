//! Decoder seam.
//!
//! The extractor never touches a decoder directly; it talks to a
//! [`MediaBackend`], which by default drives `ffprobe`/`ffmpeg` processes.

use std::time::Duration;

use async_trait::async_trait;
use image::RgbImage;
use tokio::sync::watch;
use tracing::debug;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_media, MediaMetadata};

/// How the decoder positions itself before sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekMode {
    /// Sample the very first frame without seeking.
    None,
    /// Decode up to the exact presentation time.
    Accurate,
    /// Jump to the nearest keyframe; best-effort.
    Fast,
}

/// One frame to decode at native resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeRequest {
    pub time_secs: f64,
    pub seek: SeekMode,
    pub width: u32,
    pub height: u32,
}

#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Read the source's metadata.
    async fn probe(&self, source: &str) -> MediaResult<MediaMetadata>;

    /// Decode a single frame. Must resolve with `Cancelled` soon after
    /// `cancel` is raised or its sender is dropped.
    async fn decode_frame(
        &self,
        source: &str,
        request: DecodeRequest,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<RgbImage>;
}

/// Backend spawning FFprobe/FFmpeg per call.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    /// Upper bound on one decode process
    decode_timeout: Duration,
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl FfmpegBackend {
    pub fn new(decode_timeout: Duration) -> Self {
        Self { decode_timeout }
    }

    fn build_command(source: &str, request: &DecodeRequest) -> FfmpegCommand {
        let cmd = FfmpegCommand::new(source);
        let cmd = match request.seek {
            SeekMode::None => cmd,
            SeekMode::Accurate => cmd.seek_output(request.time_secs),
            SeekMode::Fast => cmd.seek_input(request.time_secs),
        };
        cmd.single_frame().raw_rgb()
    }
}

#[async_trait]
impl MediaBackend for FfmpegBackend {
    async fn probe(&self, source: &str) -> MediaResult<MediaMetadata> {
        probe_media(source).await
    }

    async fn decode_frame(
        &self,
        source: &str,
        request: DecodeRequest,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<RgbImage> {
        let cmd = Self::build_command(source, &request);
        let bytes = FfmpegRunner::new()
            .with_cancel(cancel)
            .with_timeout(self.decode_timeout)
            .capture(&cmd)
            .await?;

        debug!(
            time = request.time_secs,
            seek = ?request.seek,
            bytes = bytes.len(),
            "Decoded raw frame"
        );

        raster_from_rgb24(bytes, request.width, request.height)
    }
}

/// Wrap packed RGB24 bytes as an image, ignoring any trailing frames.
pub fn raster_from_rgb24(mut bytes: Vec<u8>, width: u32, height: u32) -> MediaResult<RgbImage> {
    let expected = width as usize * height as usize * 3;
    if expected == 0 || bytes.len() < expected {
        return Err(MediaError::media_load(format!(
            "decoder produced {} bytes, expected {} for {}x{}",
            bytes.len(),
            expected,
            width,
            height
        )));
    }
    bytes.truncate(expected);
    RgbImage::from_raw(width, height, bytes)
        .ok_or_else(|| MediaError::media_load("raw frame buffer has the wrong size"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_from_rgb24() {
        let img = raster_from_rgb24(vec![7u8; 2 * 3 * 3 + 5], 2, 3).unwrap();
        assert_eq!(img.dimensions(), (2, 3));
        assert_eq!(img.get_pixel(1, 2).0, [7, 7, 7]);

        assert!(matches!(
            raster_from_rgb24(vec![0u8; 5], 2, 3),
            Err(MediaError::MediaLoad(_))
        ));
    }

    #[test]
    fn test_seek_mode_selects_command_shape() {
        let request = DecodeRequest {
            time_secs: 3.0,
            seek: SeekMode::None,
            width: 4,
            height: 4,
        };
        let args = FfmpegBackend::build_command("v.mp4", &request).build_args();
        assert!(!args.contains(&"-ss".to_string()));

        let args = FfmpegBackend::build_command(
            "v.mp4",
            &DecodeRequest {
                seek: SeekMode::Fast,
                ..request
            },
        )
        .build_args();
        assert!(args.contains(&"-noaccurate_seek".to_string()));
    }
}
