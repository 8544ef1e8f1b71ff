//! Backend configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Backend server configuration.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Max request body size (uploads included)
    pub max_body_size: usize,
    /// Where uploaded videos are stored
    pub upload_dir: PathBuf,
    /// Pose-estimation program
    pub program: String,
    /// Arguments placed before `--video <path>`
    pub program_args: Vec<String>,
    /// How long `GET /api/inference/next` waits for a result
    pub next_timeout: Duration,
    /// Stderr lines kept for error reports
    pub stderr_tail_lines: usize,
    /// Environment (development/production)
    pub environment: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5002,
            cors_origins: vec!["*".to_string()],
            max_body_size: 1024 * 1024 * 1024, // 1GB
            upload_dir: PathBuf::from("uploads"),
            program: "python3".to_string(),
            program_args: vec!["scripts/inference.py".to_string()],
            next_timeout: Duration::from_secs(30),
            stderr_tail_lines: 20,
            environment: "development".to_string(),
        }
    }
}

impl BackendConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("BACKEND_HOST").unwrap_or(defaults.host),
            port: std::env::var("BACKEND_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_body_size),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            program: std::env::var("INFERENCE_PROGRAM").unwrap_or(defaults.program),
            program_args: std::env::var("INFERENCE_ARGS")
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or(defaults.program_args),
            next_timeout: std::env::var("NEXT_RESULT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.next_timeout),
            stderr_tail_lines: defaults.stderr_tail_lines,
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}
