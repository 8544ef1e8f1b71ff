//! FFprobe media metadata.

use std::path::Path;
use std::process::Stdio;

use posemark_models::VideoInfo;
use serde::Deserialize;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Raw metadata as reported by the decoder, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaMetadata {
    pub width: u32,
    pub height: u32,
    /// Duration in seconds; NaN when the container does not report one
    pub duration: f64,
    pub frame_rate: Option<f64>,
}

impl MediaMetadata {
    /// Accept the metadata only if both dimensions are positive and the
    /// duration is finite and positive.
    pub fn validate(&self, default_frame_rate: f64) -> MediaResult<VideoInfo> {
        if self.width == 0 || self.height == 0 {
            return Err(MediaError::metadata_invalid(format!(
                "invalid dimensions {}x{}",
                self.width, self.height
            )));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(MediaError::metadata_invalid(format!(
                "invalid duration {}",
                self.duration
            )));
        }

        let frame_rate = self
            .frame_rate
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .unwrap_or(default_frame_rate);

        Ok(VideoInfo::new(self.width, self.height, self.duration, frame_rate))
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Probe a local file or URL for its video metadata.
pub async fn probe_media(source: &str) -> MediaResult<MediaMetadata> {
    if !is_remote(source) && !Path::new(source).exists() {
        return Err(MediaError::media_load(format!("file not found: {}", source)));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(source)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: "FFprobe failed".to_string(),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(stdout: &[u8]) -> MediaResult<MediaMetadata> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    // Find video stream
    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::media_load("no video stream found"))?;

    // Container duration first, stream duration as fallback
    let duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video_stream.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(f64::NAN);

    let frame_rate = video_stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video_stream.r_frame_rate.as_deref().and_then(parse_frame_rate));

    Ok(MediaMetadata {
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        duration,
        frame_rate,
    })
}

fn is_remote(source: &str) -> bool {
    source.contains("://")
}

/// Parse frame rate string (e.g., "30/1" or "29.97"). "0/0" yields `None`.
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 && num > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok().filter(|fps: &f64| *fps > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("0/0"), None);
    }

    #[test]
    fn test_parse_probe_output() {
        let json = br#"{
            "streams": [
                {"codec_type": "audio"},
                {"codec_type": "video", "width": 640, "height": 480,
                 "avg_frame_rate": "0/0", "r_frame_rate": "30/1"}
            ],
            "format": {"duration": "10.000000"}
        }"#;
        let meta = parse_probe_output(json).unwrap();
        assert_eq!((meta.width, meta.height), (640, 480));
        assert!((meta.duration - 10.0).abs() < f64::EPSILON);
        assert_eq!(meta.frame_rate, Some(30.0));

        let info = meta.validate(30.0).unwrap();
        assert_eq!(info.total_frames(), 300);
    }

    #[test]
    fn test_probe_output_without_video_stream() {
        let json = br#"{"streams": [{"codec_type": "audio"}], "format": {}}"#;
        assert!(matches!(parse_probe_output(json), Err(MediaError::MediaLoad(_))));
    }

    #[test]
    fn test_validate_rejects_bad_metadata() {
        let mut meta = MediaMetadata {
            width: 0,
            height: 480,
            duration: 5.0,
            frame_rate: None,
        };
        assert!(matches!(meta.validate(30.0), Err(MediaError::MetadataInvalid { .. })));

        meta.width = 640;
        meta.duration = f64::INFINITY;
        assert!(matches!(meta.validate(30.0), Err(MediaError::MetadataInvalid { .. })));

        meta.duration = 5.0;
        let info = meta.validate(25.0).unwrap();
        assert_eq!(info.frame_rate, 25.0);
    }

    #[tokio::test]
    async fn test_missing_local_file() {
        let result = probe_media("/definitely/not/here.mp4").await;
        assert!(matches!(result, Err(MediaError::MediaLoad(_))));
    }
}
