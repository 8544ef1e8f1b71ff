//! Cancellable inference session.
//!
//! The polling loop is a plain future raced against a cancellation flag, so
//! stopping a session (or dropping it) halts any pending poll or back-off
//! immediately.

use std::sync::Arc;
use std::time::Instant;

use posemark_models::api::ContinueRequest;
use posemark_models::{InferenceResult, SessionStatus};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::client::{InferenceClient, NextOutcome};
use crate::error::{ClientResult, InferenceError};

/// Cancels a running [`InferenceSession`] from anywhere.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

/// One inference run against the backend.
pub struct InferenceSession {
    client: Arc<InferenceClient>,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
    video_path: String,
    finished: bool,
    /// The backend reported `completed` or `error`, or was told to stop
    run_ended: bool,
    last_frame: Option<u64>,
}

impl InferenceSession {
    /// Check backend health, then start a run for `video_path`.
    pub async fn start(client: Arc<InferenceClient>, video_path: impl Into<String>) -> ClientResult<Self> {
        let video_path = video_path.into();

        let health = client.health().await?;
        if !health.is_ok() {
            return Err(InferenceError::Unreachable(format!(
                "backend status {}: {}",
                health.status, health.message
            )));
        }

        client.start(&video_path).await?;
        info!(video_path = %video_path, "Inference session started");

        let (cancel_tx, cancel_rx) = watch::channel(false);
        Ok(Self {
            client,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
            video_path,
            finished: false,
            run_ended: false,
            last_frame: None,
        })
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancel_tx))
    }

    pub fn video_path(&self) -> &str {
        &self.video_path
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Whether the run reached `completed`, failed, or was stopped.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Frame of the most recent result.
    pub fn last_frame(&self) -> Option<u64> {
        self.last_frame
    }

    /// Poll until the next result arrives.
    ///
    /// Returns frame results and the `completed` status; an `error` status
    /// ends the session and comes back as [`InferenceError::Backend`]. Gives
    /// up after `session_timeout` of consecutive empty polls.
    pub async fn next_result(&mut self) -> ClientResult<InferenceResult> {
        if self.finished {
            return Err(InferenceError::SessionClosed);
        }

        let config = self.client.config().clone();
        let started = Instant::now();
        let mut cancel_rx = self.cancel_rx.clone();

        loop {
            let polled = tokio::select! {
                _ = wait_cancelled(&mut cancel_rx) => return Err(InferenceError::Cancelled),
                polled = self.client.next() => polled,
            };

            match polled {
                Ok(NextOutcome::Result(result)) => return self.accept(result),
                Ok(NextOutcome::Pending) => {}
                Err(e) if e.is_retryable() => {
                    warn!(error = %e, "Polling for inference result failed, retrying");
                }
                Err(e) => {
                    self.finished = true;
                    return Err(e);
                }
            }

            if started.elapsed() >= config.session_timeout {
                return Err(InferenceError::Timeout(config.session_timeout.as_secs()));
            }

            tokio::select! {
                _ = wait_cancelled(&mut cancel_rx) => return Err(InferenceError::Cancelled),
                _ = tokio::time::sleep(config.poll_interval) => {}
            }
        }
    }

    fn accept(&mut self, result: InferenceResult) -> ClientResult<InferenceResult> {
        match &result {
            InferenceResult::Frame(frame) => {
                debug!(frame = frame.frame, predictions = frame.predictions.len(), "Inference result received");
                self.last_frame = Some(frame.frame);
            }
            InferenceResult::Status(SessionStatus::Completed) => {
                info!(video_path = %self.video_path, "Inference session completed");
                self.finished = true;
                self.run_ended = true;
            }
            InferenceResult::Status(SessionStatus::Error { error }) => {
                warn!(error = %error, "Inference session failed");
                self.finished = true;
                self.run_ended = true;
                return Err(InferenceError::Backend(error.clone()));
            }
        }
        Ok(result)
    }

    /// Send corrected annotations, unblocking the next frame.
    pub async fn submit(&self, request: &ContinueRequest) -> ClientResult<()> {
        if self.is_cancelled() {
            return Err(InferenceError::Cancelled);
        }
        if self.finished {
            return Err(InferenceError::SessionClosed);
        }
        self.client.continue_with(request).await
    }

    /// Cancel pending polls and terminate the backend run.
    ///
    /// Sessions that failed locally (timeout, cancellation, a rejected poll)
    /// still stop the backend run; only a run that already reported its
    /// terminal status is left alone.
    pub async fn stop(&mut self) -> ClientResult<()> {
        self.cancel_tx.send_replace(true);
        self.finished = true;
        if std::mem::replace(&mut self.run_ended, true) {
            return Ok(());
        }
        info!(video_path = %self.video_path, "Stopping inference session");
        self.client.stop().await
    }
}

impl Drop for InferenceSession {
    fn drop(&mut self) {
        self.cancel_tx.send_replace(true);
    }
}

async fn wait_cancelled(cancel_rx: &mut watch::Receiver<bool>) {
    loop {
        if *cancel_rx.borrow_and_update() {
            return;
        }
        if cancel_rx.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InferenceClientConfig;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn healthy_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "OK", "message": "Backend is running"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/inference/start"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/inference/stop"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .mount(&server)
            .await;
        server
    }

    fn client(server: &MockServer) -> Arc<InferenceClient> {
        let config = InferenceClientConfig {
            base_url: server.uri(),
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        };
        Arc::new(InferenceClient::new(config).unwrap())
    }

    async fn mount_next(server: &MockServer, body: serde_json::Value, times: Option<u64>) {
        let mock = Mock::given(method("GET"))
            .and(path("/api/inference/next"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body));
        match times {
            Some(n) => mock.up_to_n_times(n).with_priority(1).mount(server).await,
            None => mock.mount(server).await,
        }
    }

    #[tokio::test]
    async fn test_polls_until_result() {
        let server = healthy_server().await;
        mount_next(&server, json!({"success": false, "status": "timeout"}), Some(2)).await;
        mount_next(
            &server,
            json!({"success": true, "data": {"frame": 7, "predictions": []}}),
            None,
        )
        .await;

        let mut session = InferenceSession::start(client(&server), "v.mp4").await.unwrap();
        let result = session.next_result().await.unwrap();
        assert!(matches!(result, InferenceResult::Frame(ref f) if f.frame == 7));
        assert_eq!(session.last_frame(), Some(7));
        assert!(!session.is_finished());
    }

    #[tokio::test]
    async fn test_completed_finishes_session() {
        let server = healthy_server().await;
        mount_next(&server, json!({"success": true, "data": {"status": "completed"}}), None).await;

        let mut session = InferenceSession::start(client(&server), "v.mp4").await.unwrap();
        assert_eq!(session.next_result().await.unwrap(), InferenceResult::completed());
        assert!(session.is_finished());
        assert!(matches!(session.next_result().await, Err(InferenceError::SessionClosed)));
    }

    #[tokio::test]
    async fn test_error_status_halts() {
        let server = healthy_server().await;
        mount_next(
            &server,
            json!({"success": true, "data": {"status": "error", "error": "model crashed"}}),
            None,
        )
        .await;

        let mut session = InferenceSession::start(client(&server), "v.mp4").await.unwrap();
        let err = session.next_result().await.unwrap_err();
        assert!(matches!(err, InferenceError::Backend(ref m) if m == "model crashed"));
        assert!(session.is_finished());
    }

    #[tokio::test]
    async fn test_cancel_stops_polling() {
        let server = healthy_server().await;
        mount_next(&server, json!({"success": false, "status": "timeout"}), None).await;

        let mut session = InferenceSession::start(client(&server), "v.mp4").await.unwrap();
        let handle = session.cancel_handle();
        let poll = tokio::spawn(async move { session.next_result().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), poll).await.unwrap().unwrap();
        assert!(matches!(result, Err(InferenceError::Cancelled)));
    }

    #[tokio::test]
    async fn test_unhealthy_backend_refuses_start() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"status": "DOWN", "message": "loading"})),
            )
            .mount(&server)
            .await;

        let result = InferenceSession::start(client(&server), "v.mp4").await;
        assert!(matches!(result, Err(InferenceError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_stop_after_timeout_reaches_backend() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "OK", "message": "Backend is running"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/inference/start"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/inference/stop"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;
        mount_next(&server, json!({"success": false, "status": "timeout"}), None).await;

        let config = InferenceClientConfig {
            base_url: server.uri(),
            poll_interval: Duration::from_millis(10),
            session_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let client = Arc::new(InferenceClient::new(config).unwrap());

        let mut session = InferenceSession::start(client, "v.mp4").await.unwrap();
        assert!(matches!(session.next_result().await, Err(InferenceError::Timeout(_))));
        session.stop().await.unwrap();
        session.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let server = healthy_server().await;
        let mut session = InferenceSession::start(client(&server), "v.mp4").await.unwrap();
        session.stop().await.unwrap();
        assert!(session.is_cancelled());
        session.stop().await.unwrap();
        assert!(matches!(session.next_result().await, Err(InferenceError::SessionClosed)));
    }
}
