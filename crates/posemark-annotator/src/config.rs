//! Annotator configuration.

use posemark_inference::InferenceClientConfig;
use posemark_media::ExtractorConfig;

/// Whether frames are cropped to their detected content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CropPolicy {
    /// Detect letterbox borders on the first frame and crop every frame to them
    #[default]
    Auto,
    None,
}

impl CropPolicy {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "none" | "off" => Some(Self::None),
            _ => None,
        }
    }
}

/// Annotator configuration.
#[derive(Debug, Clone, Default)]
pub struct AnnotatorConfig {
    pub extractor: ExtractorConfig,
    pub inference: InferenceClientConfig,
    pub crop: CropPolicy,
}

impl AnnotatorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            extractor: ExtractorConfig::from_env(),
            inference: InferenceClientConfig::from_env(),
            crop: std::env::var("POSEMARK_CROP")
                .ok()
                .and_then(|s| CropPolicy::parse(&s))
                .unwrap_or_default(),
        }
    }

    pub fn with_crop(mut self, crop: CropPolicy) -> Self {
        self.crop = crop;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_policy_parse() {
        assert_eq!(CropPolicy::parse("AUTO"), Some(CropPolicy::Auto));
        assert_eq!(CropPolicy::parse("off"), Some(CropPolicy::None));
        assert_eq!(CropPolicy::parse("maybe"), None);
        assert_eq!(AnnotatorConfig::default().crop, CropPolicy::Auto);
    }
}
