//! Frame extraction for the Posemark annotator.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a cancellable runner
//! - Metadata probing through FFprobe
//! - A [`MediaBackend`] seam with the default FFmpeg implementation
//! - [`FrameExtractor`]: metadata retry/timeout, seek fallback, cancellation
//! - Letterbox border detection and cropping

pub mod backend;
pub mod borders;
pub mod command;
pub mod config;
pub mod error;
pub mod extractor;
pub mod frame;
pub mod probe;

pub use backend::{DecodeRequest, FfmpegBackend, MediaBackend, SeekMode};
pub use borders::{detect_borders, BorderDetection};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use config::ExtractorConfig;
pub use error::{MediaError, MediaResult};
pub use extractor::{CropMode, ExtractedFrame, FrameExtractor, VideoHandle};
pub use frame::{crop_frame, encode_jpeg};
pub use probe::{probe_media, MediaMetadata};
