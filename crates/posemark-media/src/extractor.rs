//! Frame extractor: resolves metadata and samples frames of one source at a time.
//!
//! Loading a new source cancels every in-flight operation tied to the
//! previous one. Loads are serialized by an async mutex so two loads never
//! race over the active source.

use std::sync::{Arc, Mutex};

use image::RgbImage;
use metrics::counter;
use posemark_models::{CropBounds, VideoInfo};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::{DecodeRequest, FfmpegBackend, MediaBackend, SeekMode};
use crate::borders::detect_borders;
use crate::command::cancelled;
use crate::config::ExtractorConfig;
use crate::error::{MediaError, MediaResult};
use crate::frame::crop_frame;

/// Crop applied to extracted frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CropMode {
    #[default]
    None,
    /// Detect letterbox borders on each frame
    Auto,
    Explicit(CropBounds),
}

/// A loaded source. Cloneable; every clone is invalidated together when the
/// extractor moves on to another source.
#[derive(Debug, Clone)]
pub struct VideoHandle {
    source: Arc<str>,
    info: VideoInfo,
    cancel: watch::Receiver<bool>,
}

impl VideoHandle {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Uncropped metadata of the source.
    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    /// Whether the extractor has released this source.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow() || self.cancel.has_changed().is_err()
    }
}

/// A decoded frame.
#[derive(Debug, Clone)]
pub struct ExtractedFrame {
    pub index: u64,
    pub image: RgbImage,
    /// Crop that was applied, in original pixel space
    pub crop: Option<CropBounds>,
}

/// Owns the decoder session for the active source.
pub struct FrameExtractor<B: MediaBackend = FfmpegBackend> {
    backend: Arc<B>,
    config: ExtractorConfig,
    /// Serializes loads
    init_lock: tokio::sync::Mutex<()>,
    /// Cancellation sender of the active source
    active: Mutex<Option<watch::Sender<bool>>>,
}

impl FrameExtractor<FfmpegBackend> {
    /// Extractor backed by FFmpeg.
    pub fn ffmpeg(config: ExtractorConfig) -> Self {
        let backend = FfmpegBackend::new(config.decode_timeout);
        Self::new(backend, config)
    }
}

impl<B: MediaBackend> FrameExtractor<B> {
    pub fn new(backend: B, config: ExtractorConfig) -> Self {
        Self {
            backend: Arc::new(backend),
            config,
            init_lock: tokio::sync::Mutex::new(()),
            active: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Load `source` and resolve its metadata.
    ///
    /// Any previously loaded source is released first. Invalid metadata is
    /// retried up to `metadata_attempts` times, and the whole load is bounded
    /// by `metadata_timeout`.
    pub async fn load(&self, source: &str) -> MediaResult<VideoHandle> {
        let _init = self.init_lock.lock().await;

        self.release();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.set_active(Some(cancel_tx));

        info!(source = %source, "Loading video metadata");

        let timeout = self.config.metadata_timeout;
        let result = match tokio::time::timeout(timeout, self.resolve_metadata(source, cancel_rx.clone())).await {
            Ok(result) => result,
            Err(_) => {
                warn!(source = %source, "Metadata load timed out after {:?}", timeout);
                Err(MediaError::Timeout(timeout.as_millis() as u64))
            }
        };

        match result {
            Ok(info) => {
                info!(
                    width = info.width,
                    height = info.height,
                    duration = info.duration,
                    frame_rate = info.frame_rate,
                    "Video metadata ready"
                );
                Ok(VideoHandle {
                    source: Arc::from(source),
                    info,
                    cancel: cancel_rx,
                })
            }
            Err(e) => {
                self.release();
                Err(e)
            }
        }
    }

    async fn resolve_metadata(
        &self,
        source: &str,
        mut cancel_rx: watch::Receiver<bool>,
    ) -> MediaResult<VideoInfo> {
        let attempts = self.config.metadata_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let probed = tokio::select! {
                _ = cancelled(&mut cancel_rx) => return Err(MediaError::Cancelled),
                probed = self.backend.probe(source) => probed,
            };

            let error = match probed.and_then(|meta| meta.validate(self.config.default_frame_rate)) {
                Ok(info) => return Ok(info),
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e),
            };

            if attempt < attempts {
                warn!(
                    attempt,
                    attempts,
                    error = %error,
                    "Metadata not ready, retrying in {:?}",
                    self.config.metadata_retry_delay
                );
                tokio::select! {
                    _ = cancelled(&mut cancel_rx) => return Err(MediaError::Cancelled),
                    _ = tokio::time::sleep(self.config.metadata_retry_delay) => {}
                }
            }
            last_error = Some(error);
        }

        Err(match last_error {
            Some(MediaError::MetadataInvalid { reason, .. }) => MediaError::MetadataInvalid { attempts, reason },
            Some(other) => other,
            None => MediaError::MetadataInvalid {
                attempts,
                reason: "no metadata".to_string(),
            },
        })
    }

    /// Decode frame `frame_index` at `frame_index / frame_rate` seconds.
    ///
    /// Frame 0 is sampled without seeking. Other frames wait for an accurate
    /// seek; if it does not finish within `seek_timeout`, a fast keyframe seek
    /// is sampled instead.
    pub async fn extract_frame(
        &self,
        handle: &VideoHandle,
        frame_index: u64,
        frame_rate: f64,
        crop: CropMode,
    ) -> MediaResult<ExtractedFrame> {
        if handle.is_cancelled() {
            return Err(MediaError::Cancelled);
        }

        let total = handle.info.total_frames();
        if total > 0 && frame_index >= total {
            return Err(MediaError::FrameOutOfRange {
                frame: frame_index,
                total,
            });
        }

        let frame_rate = if frame_rate.is_finite() && frame_rate > 0.0 {
            frame_rate
        } else {
            handle.info.frame_rate
        };

        let request = DecodeRequest {
            time_secs: frame_index as f64 / frame_rate,
            seek: if frame_index == 0 {
                SeekMode::None
            } else {
                SeekMode::Accurate
            },
            width: handle.info.width,
            height: handle.info.height,
        };

        let raster = if request.seek == SeekMode::None {
            self.decode(handle, request).await?
        } else {
            self.decode_with_fallback(handle, request).await?
        };

        let (image, applied) = match crop {
            CropMode::None => (raster, None),
            CropMode::Explicit(bounds) => (crop_frame(&raster, &bounds)?, Some(bounds)),
            CropMode::Auto => {
                let bounds = detect_borders(&raster, &self.config.borders);
                if bounds.is_full(raster.width(), raster.height()) {
                    (raster, None)
                } else {
                    (crop_frame(&raster, &bounds)?, Some(bounds))
                }
            }
        };

        counter!("posemark_frames_extracted_total").increment(1);
        debug!(frame = frame_index, cropped = applied.is_some(), "Frame extracted");

        Ok(ExtractedFrame {
            index: frame_index,
            image,
            crop: applied,
        })
    }

    async fn decode_with_fallback(&self, handle: &VideoHandle, request: DecodeRequest) -> MediaResult<RgbImage> {
        let seek_timeout = self.config.seek_timeout;
        match tokio::time::timeout(seek_timeout, self.decode(handle, request)).await {
            Ok(result) => result,
            Err(_) => {
                counter!("posemark_seek_fallbacks_total").increment(1);
                warn!(
                    time = request.time_secs,
                    "Seek did not complete within {:?}, sampling best-effort",
                    seek_timeout
                );
                let fallback = DecodeRequest {
                    seek: SeekMode::Fast,
                    ..request
                };
                self.decode(handle, fallback).await.map_err(|e| match e {
                    MediaError::Timeout(_) => MediaError::SeekTimeout(seek_timeout.as_millis() as u64),
                    other => other,
                })
            }
        }
    }

    async fn decode(&self, handle: &VideoHandle, request: DecodeRequest) -> MediaResult<RgbImage> {
        let mut cancel_rx = handle.cancel.clone();
        tokio::select! {
            _ = cancelled(&mut cancel_rx) => Err(MediaError::Cancelled),
            raster = self.backend.decode_frame(&handle.source, request, handle.cancel.clone()) => raster,
        }
    }

    /// Release the active source, cancelling its in-flight operations.
    pub fn release(&self) {
        if let Some(cancel_tx) = self.take_active() {
            let _ = cancel_tx.send(true);
            debug!("Released media source");
        }
    }

    fn set_active(&self, cancel_tx: Option<watch::Sender<bool>>) {
        if let Ok(mut active) = self.active.lock() {
            *active = cancel_tx;
        }
    }

    fn take_active(&self) -> Option<watch::Sender<bool>> {
        self.active.lock().ok().and_then(|mut active| active.take())
    }
}

impl<B: MediaBackend> Drop for FrameExtractor<B> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::MediaMetadata;
    use async_trait::async_trait;
    use image::Rgb;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    enum Probe {
        Valid,
        ZeroSize,
        Hang,
    }

    struct FakeBackend {
        probes: Mutex<VecDeque<Probe>>,
        probe_calls: AtomicU32,
        seeks: Mutex<Vec<SeekMode>>,
        accurate_delay: Duration,
        letterboxed: bool,
    }

    impl FakeBackend {
        fn new(probes: Vec<Probe>) -> Self {
            Self {
                probes: Mutex::new(probes.into()),
                probe_calls: AtomicU32::new(0),
                seeks: Mutex::new(Vec::new()),
                accurate_delay: Duration::ZERO,
                letterboxed: false,
            }
        }

        fn seeks(&self) -> Vec<SeekMode> {
            self.seeks.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MediaBackend for FakeBackend {
        async fn probe(&self, _source: &str) -> MediaResult<MediaMetadata> {
            self.probe_calls.fetch_add(1, Ordering::SeqCst);
            let next = self.probes.lock().unwrap().pop_front().unwrap_or(Probe::Valid);
            match next {
                Probe::Valid => Ok(MediaMetadata {
                    width: 64,
                    height: 48,
                    duration: 10.0,
                    frame_rate: Some(30.0),
                }),
                Probe::ZeroSize => Ok(MediaMetadata {
                    width: 0,
                    height: 0,
                    duration: f64::NAN,
                    frame_rate: None,
                }),
                Probe::Hang => std::future::pending().await,
            }
        }

        async fn decode_frame(
            &self,
            _source: &str,
            request: DecodeRequest,
            _cancel: watch::Receiver<bool>,
        ) -> MediaResult<RgbImage> {
            self.seeks.lock().unwrap().push(request.seek);
            if request.seek == SeekMode::Accurate {
                tokio::time::sleep(self.accurate_delay).await;
            }
            let letterboxed = self.letterboxed;
            Ok(RgbImage::from_fn(request.width, request.height, |_, y| {
                if letterboxed && !(8..40).contains(&y) {
                    Rgb([0, 0, 0])
                } else {
                    Rgb([128, 128, 128])
                }
            }))
        }
    }

    fn extractor(backend: FakeBackend) -> FrameExtractor<FakeBackend> {
        FrameExtractor::new(backend, ExtractorConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_retries_invalid_metadata() {
        let ex = extractor(FakeBackend::new(vec![Probe::ZeroSize, Probe::ZeroSize, Probe::Valid]));
        let handle = assert_ok!(ex.load("video.mp4").await);
        assert_eq!(handle.info().total_frames(), 300);
        assert_eq!(ex.backend.probe_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_gives_up_after_attempts() {
        let ex = extractor(FakeBackend::new(vec![Probe::ZeroSize, Probe::ZeroSize, Probe::ZeroSize]));
        let err = assert_err!(ex.load("video.mp4").await);
        assert!(matches!(err, MediaError::MetadataInvalid { attempts: 3, .. }));
        assert_eq!(ex.backend.probe_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_has_absolute_timeout() {
        let ex = extractor(FakeBackend::new(vec![Probe::Hang]));
        let err = ex.load("video.mp4").await.unwrap_err();
        assert!(matches!(err, MediaError::Timeout(15_000)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_zero_does_not_seek() {
        let ex = extractor(FakeBackend::new(vec![]));
        let handle = ex.load("video.mp4").await.unwrap();
        let frame = ex.extract_frame(&handle, 0, 30.0, CropMode::None).await.unwrap();
        assert_eq!(frame.image.dimensions(), (64, 48));
        assert_eq!(ex.backend.seeks(), vec![SeekMode::None]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_timeout_falls_back() {
        let mut backend = FakeBackend::new(vec![]);
        backend.accurate_delay = Duration::from_secs(60);
        let ex = extractor(backend);
        let handle = ex.load("video.mp4").await.unwrap();

        let frame = ex.extract_frame(&handle, 42, 30.0, CropMode::None).await.unwrap();
        assert_eq!(frame.index, 42);
        assert_eq!(ex.backend.seeks(), vec![SeekMode::Accurate, SeekMode::Fast]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_crop() {
        let mut backend = FakeBackend::new(vec![]);
        backend.letterboxed = true;
        let ex = extractor(backend);
        let handle = ex.load("video.mp4").await.unwrap();

        let frame = ex.extract_frame(&handle, 1, 30.0, CropMode::Auto).await.unwrap();
        assert_eq!(frame.crop, Some(CropBounds::new(0, 8, 64, 32)));
        assert_eq!(frame.image.dimensions(), (64, 32));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_out_of_range() {
        let ex = extractor(FakeBackend::new(vec![]));
        let handle = ex.load("video.mp4").await.unwrap();
        let err = ex.extract_frame(&handle, 300, 30.0, CropMode::None).await.unwrap_err();
        assert!(matches!(err, MediaError::FrameOutOfRange { frame: 300, total: 300 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_load_cancels_previous_handle() {
        let ex = extractor(FakeBackend::new(vec![]));
        let first = ex.load("a.mp4").await.unwrap();
        assert!(!first.is_cancelled());

        let second = ex.load("b.mp4").await.unwrap();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());

        let err = ex.extract_frame(&first, 1, 30.0, CropMode::None).await.unwrap_err();
        assert!(matches!(err, MediaError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_cancels_in_flight_decode() {
        let mut backend = FakeBackend::new(vec![]);
        backend.accurate_delay = Duration::from_secs(2);
        let ex = Arc::new(extractor(backend));
        let handle = ex.load("video.mp4").await.unwrap();

        let task = {
            let ex = Arc::clone(&ex);
            let handle = handle.clone();
            tokio::spawn(async move { ex.extract_frame(&handle, 5, 30.0, CropMode::None).await })
        };
        tokio::task::yield_now().await;
        ex.release();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(MediaError::Cancelled)));
    }
}
