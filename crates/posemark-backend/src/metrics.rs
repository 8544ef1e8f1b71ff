//! Prometheus metrics for the backend.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use posemark_models::{InferenceResult, SessionStatus};
use std::time::Instant;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "posemark_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "posemark_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "posemark_http_requests_in_flight";

    // Inference program metrics
    pub const INFERENCE_RUNS_STARTED_TOTAL: &str = "posemark_inference_runs_started_total";
    pub const INFERENCE_RUNS_TOTAL: &str = "posemark_inference_runs_total";
    pub const INFERENCE_RUNS_ACTIVE: &str = "posemark_inference_runs_active";
    pub const INFERENCE_RESULTS_TOTAL: &str = "posemark_inference_results_total";

    // Uploads
    pub const UPLOAD_BYTES_TOTAL: &str = "posemark_upload_bytes_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a spawned inference program.
pub fn record_run_started() {
    counter!(names::INFERENCE_RUNS_STARTED_TOTAL).increment(1);
    gauge!(names::INFERENCE_RUNS_ACTIVE).increment(1.0);
}

/// Record how an inference program ended (`completed`, `error`, `stopped`).
pub fn record_run_finished(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::INFERENCE_RUNS_TOTAL, &labels).increment(1);
    gauge!(names::INFERENCE_RUNS_ACTIVE).decrement(1.0);
}

/// Record a result handed out by `next`.
pub fn record_result(result: &InferenceResult) {
    let kind = match result {
        InferenceResult::Frame(_) => "frame",
        InferenceResult::Status(SessionStatus::Completed) => "completed",
        InferenceResult::Status(SessionStatus::Error { .. }) => "error",
    };
    let labels = [("kind", kind.to_string())];
    counter!(names::INFERENCE_RESULTS_TOTAL, &labels).increment(1);
}

/// Record a stored upload.
pub fn record_upload(bytes: u64) {
    counter!(names::UPLOAD_BYTES_TOTAL).increment(bytes);
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
