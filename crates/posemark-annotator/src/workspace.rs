//! One video, one annotation store, at most one inference session.
//!
//! The loading and inferring flags are raised by scope guards, so every exit
//! path (success, error, cancellation) lowers them again.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use posemark_inference::{InferenceClient, InferenceError, InferenceSession};
use posemark_media::extractor::{CropMode, ExtractedFrame, VideoHandle};
use posemark_media::frame::{encode_jpeg, JPEG_QUALITY};
use posemark_media::{FfmpegBackend, FrameExtractor, MediaBackend};
use posemark_models::{InferenceResult, SessionStatus, VideoInfo};
use scopeguard::ScopeGuard;
use tracing::{info, warn};

use crate::canvas::{handle_click, CanvasGeometry, ClickOutcome};
use crate::config::{AnnotatorConfig, CropPolicy};
use crate::error::{AnnotatorError, AnnotatorResult};
use crate::export::{export_json, import_json};
use crate::reconcile::{corrections_for_frame, ReconcileReport};
use crate::state::AnnotationState;
use crate::store::AnnotationStore;

/// Outcome of waiting for the next inference result.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceStep {
    /// A frame was merged and is now current
    Frame(ReconcileReport),
    Completed,
}

fn raise(flag: &Arc<AtomicBool>) -> ScopeGuard<Arc<AtomicBool>, impl FnOnce(Arc<AtomicBool>)> {
    flag.store(true, Ordering::SeqCst);
    scopeguard::guard(Arc::clone(flag), |flag| flag.store(false, Ordering::SeqCst))
}

/// The annotator workspace.
pub struct Workspace<B: MediaBackend = FfmpegBackend> {
    store: AnnotationStore,
    extractor: FrameExtractor<B>,
    config: AnnotatorConfig,
    client: Option<Arc<InferenceClient>>,
    video: Option<VideoHandle>,
    frame: Option<ExtractedFrame>,
    session: Option<InferenceSession>,
    loading: Arc<AtomicBool>,
    inferring: Arc<AtomicBool>,
}

impl Workspace<FfmpegBackend> {
    /// FFmpeg-backed workspace with an inference client, from config.
    pub fn from_config(config: AnnotatorConfig) -> AnnotatorResult<Self> {
        let client = InferenceClient::new(config.inference.clone())?;
        let extractor = FrameExtractor::ffmpeg(config.extractor.clone());
        Ok(Self::new(extractor, config).with_inference_client(Arc::new(client)))
    }
}

impl<B: MediaBackend> Workspace<B> {
    pub fn new(extractor: FrameExtractor<B>, config: AnnotatorConfig) -> Self {
        Self {
            store: AnnotationStore::new(),
            extractor,
            config,
            client: None,
            video: None,
            frame: None,
            session: None,
            loading: Arc::new(AtomicBool::new(false)),
            inferring: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_inference_client(mut self, client: Arc<InferenceClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut AnnotationStore {
        &mut self.store
    }

    pub fn snapshot(&self) -> Arc<AnnotationState> {
        self.store.snapshot()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub fn is_inferring(&self) -> bool {
        self.inferring.load(Ordering::SeqCst)
    }

    /// The raster of the current frame, once decoded.
    pub fn current_frame(&self) -> Option<&ExtractedFrame> {
        self.frame.as_ref()
    }

    /// The current frame as JPEG, for display or transport.
    pub fn current_frame_jpeg(&self) -> AnnotatorResult<Vec<u8>> {
        let frame = self.frame.as_ref().ok_or(AnnotatorError::NoVideo)?;
        Ok(encode_jpeg(&frame.image, JPEG_QUALITY)?)
    }

    // ---- video -----------------------------------------------------------

    /// Load `source`, reset the store and show frame 0.
    ///
    /// Any running inference session is stopped and the previous source is
    /// released before the new one loads.
    pub async fn open_video(&mut self, source: &str) -> AnnotatorResult<VideoInfo> {
        self.end_session().await;
        let _loading = raise(&self.loading);

        self.video = None;
        self.frame = None;

        let handle = self.extractor.load(source).await?;
        let info = handle.info().clone();
        self.store.load_video(info.clone());

        let crop = match self.config.crop {
            CropPolicy::Auto => CropMode::Auto,
            CropPolicy::None => CropMode::None,
        };
        let frame = self
            .extractor
            .extract_frame(&handle, 0, info.frame_rate, crop)
            .await?;
        if let Some(bounds) = frame.crop {
            info!(x = bounds.x, y = bounds.y, width = bounds.width, height = bounds.height, "Cropping black borders");
            self.store.apply_crop(bounds);
        }

        self.video = Some(handle);
        self.frame = Some(frame);

        let state = self.store.snapshot();
        info!(source = %source, total_frames = state.total_frames, "Video opened");
        Ok(state.video.clone().unwrap_or(info))
    }

    /// Decode and show `frame` (clamped to the video).
    pub async fn show_frame(&mut self, frame: u64) -> AnnotatorResult<u64> {
        let handle = self.video.clone().ok_or(AnnotatorError::NoVideo)?;
        let _loading = raise(&self.loading);

        let index = self.store.go_to_frame(frame);
        let state = self.store.snapshot();
        let crop = state.crop.map(CropMode::Explicit).unwrap_or(CropMode::None);
        let frame_rate = handle.info().frame_rate;

        let extracted = self
            .extractor
            .extract_frame(&handle, index, frame_rate, crop)
            .await?;
        self.frame = Some(extracted);
        Ok(index)
    }

    pub async fn next_frame(&mut self) -> AnnotatorResult<u64> {
        let current = self.store.snapshot().current_frame;
        self.show_frame(current.saturating_add(1)).await
    }

    pub async fn prev_frame(&mut self) -> AnnotatorResult<u64> {
        let current = self.store.snapshot().current_frame;
        self.show_frame(current.saturating_sub(1)).await
    }

    /// Release the video and stop inference.
    pub async fn close_video(&mut self) {
        self.end_session().await;
        self.extractor.release();
        self.video = None;
        self.frame = None;
    }

    // ---- canvas ----------------------------------------------------------

    pub fn click(&mut self, geometry: &CanvasGeometry, sx: f64, sy: f64) -> ClickOutcome {
        handle_click(&mut self.store, geometry, sx, sy)
    }

    // ---- export / import -------------------------------------------------

    pub fn export_json(&self) -> AnnotatorResult<String> {
        Ok(export_json(&self.store.snapshot(), Utc::now())?)
    }

    pub async fn export_to_file(&self, path: impl AsRef<Path>) -> AnnotatorResult<()> {
        let json = self.export_json()?;
        tokio::fs::write(path.as_ref(), json).await?;
        info!(path = %path.as_ref().display(), "Annotations exported");
        Ok(())
    }

    /// Replace the store contents with an export file. Nothing changes if
    /// the file is rejected.
    pub fn import_json(&mut self, json: &str) -> AnnotatorResult<()> {
        let snapshot = import_json(json)?;
        self.store.import(snapshot);
        Ok(())
    }

    pub async fn import_from_file(&mut self, path: impl AsRef<Path>) -> AnnotatorResult<()> {
        let json = tokio::fs::read_to_string(path.as_ref()).await?;
        self.import_json(&json)
    }

    // ---- inference -------------------------------------------------------

    /// Start an inference run on `video_path`, stopping any current run
    /// first.
    pub async fn start_inference(&mut self, video_path: &str) -> AnnotatorResult<()> {
        let client = self
            .client
            .clone()
            .ok_or_else(|| AnnotatorError::config_error("no inference client configured"))?;

        self.end_session().await;

        let guard = raise(&self.inferring);
        let session = InferenceSession::start(client, video_path).await?;
        self.session = Some(session);
        ScopeGuard::into_inner(guard);
        Ok(())
    }

    /// Wait for the next result, merge it and show its frame.
    ///
    /// A completed, failed or cancelled run ends the session.
    pub async fn inference_step(&mut self) -> AnnotatorResult<InferenceStep> {
        let guard = scopeguard::guard(Arc::clone(&self.inferring), |flag| flag.store(false, Ordering::SeqCst));

        let polled = {
            let session = self.session.as_mut().ok_or(AnnotatorError::NoSession)?;
            session.next_result().await
        };

        let frame = match polled {
            Ok(InferenceResult::Frame(frame)) => frame,
            Ok(InferenceResult::Status(SessionStatus::Completed)) => {
                self.session = None;
                return Ok(InferenceStep::Completed);
            }
            Ok(InferenceResult::Status(SessionStatus::Error { error })) => {
                self.end_session().await;
                return Err(InferenceError::Backend(error).into());
            }
            Err(e) => {
                warn!(error = %e, "Inference session halted");
                self.end_session().await;
                return Err(e.into());
            }
        };

        let report = self.store.apply_inference(&frame);
        ScopeGuard::into_inner(guard);

        if self.video.is_some() {
            self.show_frame(report.frame).await?;
        }
        Ok(InferenceStep::Frame(report))
    }

    /// Send the current frame's (possibly corrected) annotations.
    pub async fn submit_corrections(&mut self) -> AnnotatorResult<()> {
        let session = self.session.as_ref().ok_or(AnnotatorError::NoSession)?;
        let state = self.store.snapshot();
        let request = corrections_for_frame(&state, state.current_frame);
        session.submit(&request).await?;
        Ok(())
    }

    /// Stop the current run, if any.
    pub async fn stop_inference(&mut self) -> AnnotatorResult<()> {
        let _inferring = scopeguard::guard(Arc::clone(&self.inferring), |flag| flag.store(false, Ordering::SeqCst));
        if let Some(mut session) = self.session.take() {
            session.stop().await?;
        }
        Ok(())
    }

    /// Drop the current session, stopping its backend run if it is still
    /// going. A backend that cannot be reached is only logged.
    async fn end_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.stop().await {
                warn!(error = %e, video_path = %session.video_path(), "Failed to stop inference run");
            }
        }
        self.inferring.store(false, Ordering::SeqCst);
    }

    /// Drive a whole run: merge every frame and send it straight back
    /// uncorrected. Returns the number of frames merged.
    pub async fn run_inference(&mut self, video_path: &str) -> AnnotatorResult<u64> {
        self.start_inference(video_path).await?;
        let mut frames = 0;
        loop {
            match self.inference_step().await? {
                InferenceStep::Frame(_) => {
                    frames += 1;
                    self.submit_corrections().await?;
                }
                InferenceStep::Completed => return Ok(frames),
            }
        }
    }
}
