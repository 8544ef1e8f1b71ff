//! Frame extractor configuration.

use std::time::Duration;

use posemark_models::catalog::DEFAULT_FRAME_RATE;

use crate::borders::BorderDetection;

/// Frame extractor configuration.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Metadata load attempts before giving up
    pub metadata_attempts: u32,
    /// Delay between metadata attempts
    pub metadata_retry_delay: Duration,
    /// Absolute bound on the whole metadata load, retries included
    pub metadata_timeout: Duration,
    /// How long to wait for an accurate seek before sampling best-effort
    pub seek_timeout: Duration,
    /// Upper bound on a single decode process
    pub decode_timeout: Duration,
    /// Frame rate used when the media reports none
    pub default_frame_rate: f64,
    /// Border detection heuristics
    pub borders: BorderDetection,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            metadata_attempts: 3,
            metadata_retry_delay: Duration::from_secs(1),
            metadata_timeout: Duration::from_secs(15),
            seek_timeout: Duration::from_secs(3),
            decode_timeout: Duration::from_secs(30),
            default_frame_rate: DEFAULT_FRAME_RATE,
            borders: BorderDetection::default(),
        }
    }
}

impl ExtractorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            metadata_attempts: env_parse("POSEMARK_METADATA_ATTEMPTS")
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.metadata_attempts),
            metadata_retry_delay: env_parse("POSEMARK_METADATA_RETRY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.metadata_retry_delay),
            metadata_timeout: env_parse("POSEMARK_METADATA_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.metadata_timeout),
            seek_timeout: env_parse("POSEMARK_SEEK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.seek_timeout),
            decode_timeout: env_parse("POSEMARK_DECODE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.decode_timeout),
            default_frame_rate: env_parse("POSEMARK_DEFAULT_FPS")
                .filter(|fps: &f64| fps.is_finite() && *fps > 0.0)
                .unwrap_or(defaults.default_frame_rate),
            borders: BorderDetection {
                threshold: env_parse("POSEMARK_BORDER_THRESHOLD")
                    .unwrap_or(defaults.borders.threshold),
                ..defaults.borders
            },
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
