use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use image::{ImageFormat, RgbImage};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Result, SamplerError};
use crate::video::sampler::FrameDecoder;
use crate::video::types::{SourceMetadata, VideoSource};

/// ffprobe JSON output, only the fields we read
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
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
}

struct OpenSource {
    name: String,
    path: PathBuf,
    metadata: SourceMetadata,
}

/// Frame decoder backed by the `ffprobe` and `ffmpeg` executables.
///
/// Each capture is a single accurate seek (`-ss` before `-i`) that returns
/// one PNG on stdout; child processes never outlive the call.
pub struct FfmpegDecoder {
    ffmpeg: String,
    ffprobe: String,
    current: Option<OpenSource>,
}

impl FfmpegDecoder {
    pub fn new<S: Into<String>>(ffmpeg: S, ffprobe: S) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            current: None,
        }
    }

    async fn probe(&self, source: &VideoSource) -> Result<SourceMetadata> {
        let unavailable = |reason: String| SamplerError::MetadataUnavailable {
            name: source.name().to_string(),
            reason,
        };

        let output = Command::new(&self.ffprobe)
            .args([
                "-v", "quiet",
                "-print_format", "json",
                "-show_format",
                "-show_streams",
                "-select_streams", "v:0",
            ])
            .arg(source.path())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| unavailable(format!("failed to run {}: {}", self.ffprobe, e)))?;

        if !output.status.success() {
            return Err(unavailable(format!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))
            .into());
        }

        let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| unavailable(format!("invalid ffprobe output: {}", e)))?;

        parse_metadata(&probe).map_err(|reason| unavailable(reason).into())
    }

    fn check_available(&self) -> bool {
        std::process::Command::new(&self.ffmpeg)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

fn parse_metadata(probe: &FfprobeOutput) -> std::result::Result<SourceMetadata, String> {
    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref().unwrap_or("video") == "video")
        .ok_or_else(|| "no video stream".to_string())?;

    let width = stream.width.filter(|w| *w > 0).ok_or("unknown width")?;
    let height = stream.height.filter(|h| *h > 0).ok_or("unknown height")?;

    // The container may run past the last video frame when audio is longer
    let parse_secs = |d: Option<&str>| {
        d.and_then(|d| d.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d >= 0.0)
    };
    let duration_secs = parse_secs(stream.duration.as_deref())
        .or_else(|| parse_secs(probe.format.as_ref().and_then(|f| f.duration.as_deref())))
        .ok_or("unknown duration")?;

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(30.0);

    Ok(SourceMetadata {
        duration_ms: (duration_secs * 1000.0).round() as u64,
        width,
        height,
        fps,
    })
}

/// Parse ffprobe rates like "30000/1001"
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let (num, den) = rate.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}

/// Latest seek target that still lands on a decodable frame.
///
/// Seeking exactly to the container duration yields nothing, so targets at
/// the very end are pulled back by one source frame.
fn seek_target_ms(time_ms: u64, metadata: &SourceMetadata) -> u64 {
    let frame_ms = (1000.0 / metadata.fps).ceil() as u64;
    let last_frame_ms = metadata.duration_ms.saturating_sub(frame_ms);
    time_ms.min(last_frame_ms)
}

#[async_trait]
impl FrameDecoder for FfmpegDecoder {
    async fn open(&mut self, source: &VideoSource) -> Result<SourceMetadata> {
        if !self.check_available() {
            return Err(SamplerError::MetadataUnavailable {
                name: source.name().to_string(),
                reason: format!("{} not found, please install FFmpeg", self.ffmpeg),
            }
            .into());
        }

        if !source.path().is_file() {
            return Err(SamplerError::MetadataUnavailable {
                name: source.name().to_string(),
                reason: format!("{} is not a file", source.path().display()),
            }
            .into());
        }

        if !source.is_supported() {
            warn!("{} does not look like a video, trying anyway", source.name());
        }

        let metadata = self.probe(source).await?;
        info!(
            "Opened {}: {}x{} @ {:.2}fps, {}ms",
            source.name(),
            metadata.width,
            metadata.height,
            metadata.fps,
            metadata.duration_ms
        );

        self.current = Some(OpenSource {
            name: source.name().to_string(),
            path: source.path().to_path_buf(),
            metadata,
        });
        Ok(metadata)
    }

    async fn capture(&mut self, time_ms: u64) -> Result<RgbImage> {
        let Some(open) = self.current.as_ref() else {
            return Err(SamplerError::SeekFailure {
                name: "<none>".to_string(),
                time_ms,
                reason: "no source is open".to_string(),
            }
            .into());
        };

        let seek_failure = |reason: String| SamplerError::SeekFailure {
            name: open.name.clone(),
            time_ms,
            reason,
        };

        let target_ms = seek_target_ms(time_ms, &open.metadata);
        let seek = format!("{:.3}", target_ms as f64 / 1000.0);
        debug!("Seeking {} to {}s", open.name, seek);

        let output = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-ss", &seek, "-i"])
            .arg(&open.path)
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "pipe:1"])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| seek_failure(format!("failed to run {}: {}", self.ffmpeg, e)))?;

        if !output.status.success() {
            return Err(seek_failure(String::from_utf8_lossy(&output.stderr).trim().to_string()).into());
        }

        if output.stdout.is_empty() {
            return Err(seek_failure("no frame decoded at seek target".to_string()).into());
        }

        let picture = image::load_from_memory_with_format(&output.stdout, ImageFormat::Png)
            .map_err(|e| seek_failure(format!("undecodable picture: {}", e)))?;

        Ok(picture.to_rgb8())
    }

    async fn close(&mut self) {
        if let Some(open) = self.current.take() {
            debug!("Closed {}", open.name);
        }
    }
}
