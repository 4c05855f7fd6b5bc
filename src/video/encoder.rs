use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use image::RgbImage;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audio::AudioBuffer;
use crate::config::OutputConfig;
use crate::error::{EncodeError, Result};

const CHUNK_SIZE: usize = 64 * 1024;

/// The finished container, produced once per successful compilation
#[derive(Debug)]
pub struct EncodedOutput {
    bytes: Vec<u8>,
    mime_type: String,
    extension: String,
    frame_count: u64,
}

impl EncodedOutput {
    /// Assemble the output from the chunks in the order they were emitted
    pub fn from_chunks<S: Into<String>>(
        chunks: Vec<Vec<u8>>,
        mime_type: S,
        extension: S,
        frame_count: u64,
    ) -> Self {
        Self {
            bytes: chunks.concat(),
            mime_type: mime_type.into(),
            extension: extension.into(),
            frame_count,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Download name, `compilation-<epoch-millis>.<ext>`
    pub fn file_name(&self, epoch_millis: i64) -> String {
        format!("compilation-{}.{}", epoch_millis, self.extension)
    }

    /// Write the output into `dir` under a fresh download name
    pub fn save_to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name(chrono::Utc::now().timestamp_millis()));
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

/// Consumes composite frames and produces one container.
///
/// `start` is called once with the number of frames that will follow, then
/// every frame in index order, then `finish`. `abort` tears everything down
/// on any other exit path.
#[async_trait]
pub trait Encoder: Send {
    async fn start(&mut self, audio: Option<&AudioBuffer>, total_frames: u64) -> Result<()>;

    async fn submit_frame(&mut self, frame: &RgbImage) -> Result<()>;

    async fn finish(&mut self) -> Result<EncodedOutput>;

    async fn abort(&mut self);
}

/// Encoder settings derived from the output config and the timing model
#[derive(Debug, Clone)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_bitrate: u64,
    pub container: String,
    pub mime_type: String,
    pub video_codec: String,
    pub audio_codec: String,
    pub ffmpeg: String,
}

impl EncoderSettings {
    pub fn from_config(output: &OutputConfig, fps: u32) -> Self {
        Self {
            width: output.width,
            height: output.height,
            fps,
            video_bitrate: output.video_bitrate,
            container: output.container.clone(),
            mime_type: output.mime_type.clone(),
            video_codec: output.video_codec.clone(),
            audio_codec: output.audio_codec.clone(),
            ffmpeg: output.ffmpeg.clone(),
        }
    }

    /// Length of `total_frames` at the configured frame rate
    pub fn duration_secs(&self, total_frames: u64) -> f64 {
        total_frames as f64 / self.fps.max(1) as f64
    }

    /// ffmpeg arguments; raw RGB frames on stdin, container on stdout.
    /// An attached track is cut at the end of the video.
    fn ffmpeg_args(&self, audio_path: Option<&Path>, total_frames: u64) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-loglevel".into(), "error".into(),
            "-f".into(), "rawvideo".into(),
            "-pix_fmt".into(), "rgb24".into(),
            "-s".into(), format!("{}x{}", self.width, self.height),
            "-r".into(), self.fps.to_string(),
            "-i".into(), "pipe:0".into(),
        ];

        if let Some(path) = audio_path {
            args.extend(["-i".into(), path.display().to_string()]);
            args.extend(["-map".into(), "0:v".into(), "-map".into(), "1:a".into()]);
            args.extend([
                "-t".into(),
                format!("{:.3}", self.duration_secs(total_frames)),
            ]);
        }

        args.extend([
            "-c:v".into(), self.video_codec.clone(),
            "-b:v".into(), self.video_bitrate.to_string(),
            "-pix_fmt".into(), "yuv420p".into(),
        ]);

        if audio_path.is_some() {
            args.extend([
                "-c:a".into(), self.audio_codec.clone(),
                "-ar".into(), "48000".into(),
            ]);
        } else {
            args.push("-an".into());
        }

        args.extend(["-f".into(), self.container.clone(), "pipe:1".into()]);
        args
    }
}

/// Encoder driving an `ffmpeg` child process.
///
/// The container is read back from stdout in chunks while frames are still
/// being written, by a task on the same runtime.
pub struct FfmpegEncoder {
    settings: EncoderSettings,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    chunks: Option<JoinHandle<std::io::Result<Vec<Vec<u8>>>>>,
    stderr: Option<JoinHandle<String>>,
    audio_file: Option<NamedTempFile>,
    frames_submitted: u64,
}

impl FfmpegEncoder {
    pub fn new(settings: EncoderSettings) -> Self {
        Self {
            settings,
            child: None,
            stdin: None,
            chunks: None,
            stderr: None,
            audio_file: None,
            frames_submitted: 0,
        }
    }

    pub fn check_ffmpeg_available(ffmpeg: &str) -> bool {
        std::process::Command::new(ffmpeg)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn failure<S: Into<String>>(reason: S) -> EncodeError {
        EncodeError::EncodeFailure { reason: reason.into() }
    }

    async fn collect_stderr(&mut self) -> String {
        match self.stderr.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        }
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn start(&mut self, audio: Option<&AudioBuffer>, total_frames: u64) -> Result<()> {
        if self.child.is_some() {
            return Err(Self::failure("encoder already started").into());
        }

        if !Self::check_ffmpeg_available(&self.settings.ffmpeg) {
            return Err(Self::failure("FFmpeg not found. Please install FFmpeg.").into());
        }

        if let Some(audio) = audio.filter(|a| !a.is_empty()) {
            let file = tempfile::Builder::new()
                .prefix("scene_reel_audio_")
                .suffix(".wav")
                .tempfile()?;
            audio
                .write_wav(file.path())
                .map_err(|e| Self::failure(format!("failed to stage audio: {}", e)))?;
            self.audio_file = Some(file);
        }

        let args = self
            .settings
            .ffmpeg_args(self.audio_file.as_ref().map(|f| f.path()), total_frames);
        debug!("ffmpeg {}", args.join(" "));

        let mut child = Command::new(&self.settings.ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Self::failure(format!("failed to spawn ffmpeg: {}", e)))?;

        let stdin = child.stdin.take().ok_or_else(|| Self::failure("ffmpeg stdin unavailable"))?;
        let mut stdout = child.stdout.take().ok_or_else(|| Self::failure("ffmpeg stdout unavailable"))?;
        let mut stderr = child.stderr.take().ok_or_else(|| Self::failure("ffmpeg stderr unavailable"))?;

        self.chunks = Some(tokio::spawn(async move {
            let mut chunks = Vec::new();
            let mut buf = vec![0u8; CHUNK_SIZE];
            loop {
                let n = stdout.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                chunks.push(buf[..n].to_vec());
            }
            Ok(chunks)
        }));

        self.stderr = Some(tokio::spawn(async move {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text).await;
            text
        }));

        self.child = Some(child);
        self.stdin = Some(stdin);
        self.frames_submitted = 0;

        info!(
            "Encoder started: {}x{} @ {}fps, {} bit/s {}, audio: {}",
            self.settings.width,
            self.settings.height,
            self.settings.fps,
            self.settings.video_bitrate,
            self.settings.container,
            self.audio_file.is_some()
        );
        Ok(())
    }

    async fn submit_frame(&mut self, frame: &RgbImage) -> Result<()> {
        if frame.width() != self.settings.width || frame.height() != self.settings.height {
            return Err(EncodeError::FrameSizeMismatch {
                got_width: frame.width(),
                got_height: frame.height(),
                width: self.settings.width,
                height: self.settings.height,
            }
            .into());
        }

        let stdin = self.stdin.as_mut().ok_or(EncodeError::NotRunning)?;
        let written = stdin.write_all(frame.as_raw()).await;
        if let Err(e) = written {
            let stderr = self.collect_stderr().await;
            return Err(Self::failure(format!(
                "failed to write frame {}: {} {}",
                self.frames_submitted,
                e,
                stderr.trim()
            ))
            .into());
        }

        self.frames_submitted += 1;
        Ok(())
    }

    async fn finish(&mut self) -> Result<EncodedOutput> {
        let mut stdin = self.stdin.take().ok_or(EncodeError::NotRunning)?;
        let mut child = self.child.take().ok_or(EncodeError::NotRunning)?;

        // Closing stdin is the flush signal
        stdin.flush().await?;
        drop(stdin);

        let status = child
            .wait()
            .await
            .map_err(|e| Self::failure(format!("failed to wait for ffmpeg: {}", e)))?;

        let chunks = match self.chunks.take() {
            Some(handle) => handle
                .await
                .map_err(|e| Self::failure(format!("output reader failed: {}", e)))?
                .map_err(|e| Self::failure(format!("failed to read ffmpeg output: {}", e)))?,
            None => Vec::new(),
        };
        let stderr = self.collect_stderr().await;
        self.audio_file = None;

        if !status.success() {
            return Err(Self::failure(format!("ffmpeg exited with {}: {}", status, stderr.trim())).into());
        }

        if chunks.is_empty() {
            return Err(Self::failure("ffmpeg produced no output").into());
        }

        debug!("Collected {} output chunks", chunks.len());
        Ok(EncodedOutput::from_chunks(
            chunks,
            self.settings.mime_type.clone(),
            self.settings.container.clone(),
            self.frames_submitted,
        ))
    }

    async fn abort(&mut self) {
        self.stdin = None;

        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                warn!("Failed to kill ffmpeg: {}", e);
            }
            let _ = child.wait().await;
        }

        if let Some(handle) = self.chunks.take() {
            handle.abort();
        }
        if let Some(handle) = self.stderr.take() {
            handle.abort();
        }

        self.audio_file = None;
        debug!("Encoder aborted after {} frames", self.frames_submitted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> EncoderSettings {
        EncoderSettings::from_config(&OutputConfig::default(), 30)
    }

    #[test]
    fn test_output_naming() {
        let output = EncodedOutput::from_chunks(
            vec![b"ab".to_vec(), b"cd".to_vec()],
            "video/webm",
            "webm",
            90,
        );
        assert_eq!(output.bytes(), b"abcd");
        assert_eq!(output.mime_type(), "video/webm");
        assert_eq!(output.file_name(1700000000123), "compilation-1700000000123.webm");
    }

    #[test]
    fn test_save_to_dir() {
        let dir = tempfile::tempdir().unwrap();
        let output = EncodedOutput::from_chunks(vec![vec![1, 2, 3]], "video/webm", "webm", 1);

        let path = output.save_to_dir(dir.path()).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("compilation-") && name.ends_with(".webm"));
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_ffmpeg_args_with_audio() {
        let args = settings().ffmpeg_args(Some(Path::new("/tmp/a.wav")), 180);
        let joined = args.join(" ");

        assert!(joined.contains("-f rawvideo -pix_fmt rgb24 -s 1280x720 -r 30 -i pipe:0"));
        assert!(joined.contains("-i /tmp/a.wav -map 0:v -map 1:a"));
        assert!(joined.contains("-b:v 2500000"));
        assert!(joined.contains("-c:a libopus"));
        assert!(joined.ends_with("-f webm pipe:1"));
    }

    #[test]
    fn test_ffmpeg_args_cut_track_at_video_end() {
        // Two scenes at 30 fps, a 15 s track must not outlast the 6 s of video
        let args = settings().ffmpeg_args(Some(Path::new("/tmp/a.wav")), 180);
        let joined = args.join(" ");
        assert!(joined.contains("-map 1:a -t 6.000"));

        // A shorter track must not cut the video
        assert!(!joined.contains("-shortest"));

        let args = settings().ffmpeg_args(Some(Path::new("/tmp/a.wav")), 135);
        assert!(args.join(" ").contains("-t 4.500"));
    }

    #[test]
    fn test_ffmpeg_args_without_audio() {
        let args = settings().ffmpeg_args(None, 90);
        assert!(args.contains(&"-an".to_string()));
        assert!(!args.contains(&"-map".to_string()));
        assert!(!args.contains(&"-t".to_string()));
    }

    #[tokio::test]
    async fn test_submit_before_start_fails() {
        let mut encoder = FfmpegEncoder::new(settings());
        let frame = RgbImage::new(1280, 720);
        assert!(encoder.submit_frame(&frame).await.is_err());
        assert!(encoder.finish().await.is_err());
        encoder.abort().await;
    }

    #[tokio::test]
    async fn test_frame_size_checked() {
        let mut encoder = FfmpegEncoder::new(settings());
        let frame = RgbImage::new(640, 360);
        let result = encoder.submit_frame(&frame).await;
        assert!(matches!(
            result,
            Err(crate::error::ReelError::Encode(EncodeError::FrameSizeMismatch { .. }))
        ));
    }
}
