//! Inference backend HTTP client.

use std::time::Duration;

use posemark_models::api::{
    AckResponse, ContinueRequest, HealthResponse, NextResponse, StartRequest,
};
use posemark_models::InferenceResult;
use reqwest::{Client, Response};
use tracing::{debug, warn};

use crate::error::{ClientResult, InferenceError};

/// Configuration for the inference client.
#[derive(Debug, Clone)]
pub struct InferenceClientConfig {
    /// Base URL of the backend
    pub base_url: String,
    /// Timeout for ordinary requests
    pub request_timeout: Duration,
    /// Timeout for `next`, which the backend holds open while waiting
    pub next_timeout: Duration,
    /// Max retries for transient failures
    pub max_retries: u32,
    /// Pause between `next` polls that came back empty
    pub poll_interval: Duration,
    /// Give up waiting for a single frame after this long
    pub session_timeout: Duration,
}

impl Default for InferenceClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5002".to_string(),
            request_timeout: Duration::from_secs(10),
            next_timeout: Duration::from_secs(35),
            max_retries: 2,
            poll_interval: Duration::from_secs(1),
            session_timeout: Duration::from_secs(120),
        }
    }
}

impl InferenceClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("INFERENCE_API_URL").unwrap_or(defaults.base_url),
            request_timeout: Duration::from_secs(
                std::env::var("INFERENCE_REQUEST_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            next_timeout: Duration::from_secs(
                std::env::var("INFERENCE_NEXT_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(35),
            ),
            max_retries: std::env::var("INFERENCE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            poll_interval: Duration::from_millis(
                std::env::var("INFERENCE_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            session_timeout: Duration::from_secs(
                std::env::var("INFERENCE_SESSION_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Outcome of one `next` poll.
#[derive(Debug, Clone, PartialEq)]
pub enum NextOutcome {
    Result(InferenceResult),
    /// The backend had nothing yet
    Pending,
}

/// Client for the inference backend.
pub struct InferenceClient {
    http: Client,
    config: InferenceClientConfig,
}

impl InferenceClient {
    /// Create a new client.
    pub fn new(config: InferenceClientConfig) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(InferenceError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> ClientResult<Self> {
        Self::new(InferenceClientConfig::from_env())
    }

    pub fn config(&self) -> &InferenceClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// `GET /api/health`
    pub async fn health(&self) -> ClientResult<HealthResponse> {
        let response = self
            .http
            .get(self.url("/api/health"))
            .send()
            .await
            .map_err(send_error)?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Whether the backend answers its health check.
    pub async fn health_check(&self) -> bool {
        match self.health().await {
            Ok(health) if health.is_ok() => true,
            Ok(health) => {
                warn!("Inference backend reports status {}", health.status);
                false
            }
            Err(e) => {
                warn!("Inference backend health check error: {}", e);
                false
            }
        }
    }

    /// `POST /api/inference/start`
    pub async fn start(&self, video_path: &str) -> ClientResult<AckResponse> {
        let url = self.url("/api/inference/start");
        let body = StartRequest {
            video_path: video_path.to_string(),
        };

        debug!(video_path = %video_path, "Starting inference run");

        let ack: AckResponse = self
            .with_retry(|| async {
                let response = self.http.post(&url).json(&body).send().await.map_err(send_error)?;
                Ok::<AckResponse, InferenceError>(check_status(response).await?.json().await?)
            })
            .await?;

        ensure_success(ack)
    }

    /// `GET /api/inference/next`: one bounded wait for the next result.
    pub async fn next(&self) -> ClientResult<NextOutcome> {
        let sent = self
            .http
            .get(self.url("/api/inference/next"))
            .timeout(self.config.next_timeout)
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Ok(NextOutcome::Pending),
            Err(e) => return Err(send_error(e)),
        };

        let status = response.status();
        if status == reqwest::StatusCode::REQUEST_TIMEOUT || status == reqwest::StatusCode::GATEWAY_TIMEOUT {
            return Ok(NextOutcome::Pending);
        }

        let next: NextResponse = check_status(response).await?.json().await?;
        match next.data {
            Some(data) => Ok(NextOutcome::Result(data)),
            None if next.is_timeout() => Ok(NextOutcome::Pending),
            None => Err(InferenceError::Backend(
                next.message.unwrap_or_else(|| "next returned no data".to_string()),
            )),
        }
    }

    /// `POST /api/inference/continue`
    pub async fn continue_with(&self, request: &ContinueRequest) -> ClientResult<()> {
        let url = self.url("/api/inference/continue");
        debug!(frame = request.frame_number, persons = request.annotations.len(), "Sending corrections");

        let ack: AckResponse = self
            .with_retry(|| async {
                let response = self.http.post(&url).json(request).send().await.map_err(send_error)?;
                Ok::<AckResponse, InferenceError>(check_status(response).await?.json().await?)
            })
            .await?;

        ensure_success(ack).map(|_| ())
    }

    /// `POST /api/inference/stop`
    pub async fn stop(&self) -> ClientResult<()> {
        let response = self
            .http
            .post(self.url("/api/inference/stop"))
            .send()
            .await
            .map_err(send_error)?;
        let ack: AckResponse = check_status(response).await?.json().await?;
        ensure_success(ack).map(|_| ())
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> ClientResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = ClientResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "Inference request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn send_error(e: reqwest::Error) -> InferenceError {
    if e.is_connect() {
        InferenceError::Unreachable(e.to_string())
    } else {
        InferenceError::Network(e)
    }
}

async fn check_status(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(InferenceError::request_failed(status.as_u16(), body))
}

fn ensure_success(ack: AckResponse) -> ClientResult<AckResponse> {
    if ack.success {
        Ok(ack)
    } else {
        Err(InferenceError::Backend(
            ack.message.unwrap_or_else(|| "backend reported failure".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> InferenceClient {
        InferenceClient::new(InferenceClientConfig::default().with_base_url(server.uri())).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = InferenceClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:5002");
        assert_eq!(config.max_retries, 2);
        assert!(config.next_timeout > Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "OK", "message": "Backend is running"})),
            )
            .mount(&server)
            .await;

        assert!(client_for(&server).health_check().await);
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        let config = InferenceClientConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let client = InferenceClient::new(config).unwrap();
        assert!(!client.health_check().await);
    }

    #[tokio::test]
    async fn test_start_sends_video_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/inference/start"))
            .and(body_json(json!({"videoPath": "uploads/a.mp4"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"success": true, "message": "started"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let ack = client_for(&server).start("uploads/a.mp4").await.unwrap();
        assert_eq!(ack.message.as_deref(), Some("started"));
    }

    #[tokio::test]
    async fn test_start_reported_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/inference/start"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"success": false, "message": "no video"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server).start("x.mp4").await.unwrap_err();
        assert!(matches!(err, InferenceError::Backend(ref m) if m == "no video"));
    }

    #[tokio::test]
    async fn test_start_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/inference/start"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/inference/start"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .mount(&server)
            .await;

        assert!(client_for(&server).start("x.mp4").await.is_ok());
    }

    #[tokio::test]
    async fn test_next_outcomes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/inference/next"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false, "status": "timeout"
            })))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/inference/next"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "data": {"frame": 2, "predictions": []}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.next().await.unwrap(), NextOutcome::Pending);
        match client.next().await.unwrap() {
            NextOutcome::Result(InferenceResult::Frame(frame)) => assert_eq!(frame.frame, 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bad_request_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/inference/continue"))
            .respond_with(ResponseTemplate::new(400).set_body_string("missing frameNumber"))
            .expect(1)
            .mount(&server)
            .await;

        let request = ContinueRequest {
            frame_number: 1,
            persons: Default::default(),
            annotations: Default::default(),
        };
        let err = client_for(&server).continue_with(&request).await.unwrap_err();
        assert!(matches!(err, InferenceError::RequestFailed { status: 400, .. }));
    }
}
