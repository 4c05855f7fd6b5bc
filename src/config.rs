use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::{
    audio::AudioFit,
    error::{ConfigError, Result},
};

/// Background track used when no other locator is configured
pub const DEFAULT_AUDIO_LOCATOR: &str =
    "https://storage.googleapis.com/gtv-videos-bucket/sample/ForBiggerEscapes.mp4";

/// Main configuration for scene-reel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Frame sampling settings
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Timing model of the composition
    #[serde(default)]
    pub composition: CompositionConfig,

    /// Output container settings
    #[serde(default)]
    pub output: OutputConfig,

    /// Background audio settings
    #[serde(default)]
    pub audio: AudioConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.sampling.validate()?;
        self.composition.validate()?;
        self.output.validate()?;
        self.audio.validate()?;
        Ok(())
    }
}

fn invalid<V: ToString>(key: &str, value: V) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Frame sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Time between two captured frames (ms)
    pub interval_ms: u64,

    /// Scale applied to every captured frame
    pub downscale: f32,

    /// Maximum number of sources accepted per analysis
    pub max_sources: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            downscale: 0.5,
            max_sources: 3,
        }
    }
}

impl SamplingConfig {
    fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(invalid("sampling.interval_ms", self.interval_ms).into());
        }

        if !(self.downscale > 0.0 && self.downscale <= 1.0) {
            return Err(invalid("sampling.downscale", self.downscale).into());
        }

        if self.max_sources == 0 {
            return Err(invalid("sampling.max_sources", self.max_sources).into());
        }

        Ok(())
    }
}

/// Composition timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositionConfig {
    /// Output frame rate
    pub fps: u32,

    /// Screen time of every selected scene (seconds)
    pub seconds_per_scene: u32,

    /// Trailing frames of a scene spent crossfading into the next one
    pub transition_frames: u32,

    /// Pace rendering at `fps` instead of running as fast as possible
    pub realtime_pacing: bool,
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            seconds_per_scene: 3,
            transition_frames: 15,
            realtime_pacing: false,
        }
    }
}

impl CompositionConfig {
    /// Frame budget of a single scene
    pub fn frames_per_scene(&self) -> u32 {
        self.fps * self.seconds_per_scene
    }

    fn validate(&self) -> Result<()> {
        if self.fps == 0 {
            return Err(invalid("composition.fps", self.fps).into());
        }

        if self.seconds_per_scene == 0 {
            return Err(invalid("composition.seconds_per_scene", self.seconds_per_scene).into());
        }

        if self.transition_frames >= self.frames_per_scene() {
            return Err(invalid(
                "composition.transition_frames",
                format!("{} (scene budget {})", self.transition_frames, self.frames_per_scene()),
            )
            .into());
        }

        Ok(())
    }
}

/// Output container configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Canvas width
    pub width: u32,

    /// Canvas height
    pub height: u32,

    /// Target video bitrate (bits/sec)
    pub video_bitrate: u64,

    /// Container format handed to ffmpeg, also used as the file extension
    pub container: String,

    /// Mime type reported with the encoded output
    pub mime_type: String,

    /// ffmpeg video encoder name
    pub video_codec: String,

    /// ffmpeg audio encoder name
    pub audio_codec: String,

    /// ffmpeg executable
    pub ffmpeg: String,

    /// ffprobe executable
    pub ffprobe: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            video_bitrate: 2_500_000,
            container: "webm".to_string(),
            mime_type: "video/webm".to_string(),
            video_codec: "libvpx".to_string(),
            audio_codec: "libopus".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

impl OutputConfig {
    fn validate(&self) -> Result<()> {
        // yuv420p output needs even dimensions
        if self.width == 0 || self.width % 2 != 0 {
            return Err(invalid("output.width", self.width).into());
        }

        if self.height == 0 || self.height % 2 != 0 {
            return Err(invalid("output.height", self.height).into());
        }

        if self.video_bitrate == 0 {
            return Err(invalid("output.video_bitrate", self.video_bitrate).into());
        }

        if self.container.trim().is_empty() {
            return Err(invalid("output.container", &self.container).into());
        }

        Ok(())
    }
}

/// Background audio configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// URL or file path of the background track
    pub locator: String,

    /// How the track is fitted to the video length
    pub fit: AudioFit,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            locator: DEFAULT_AUDIO_LOCATOR.to_string(),
            fit: AudioFit::default(),
        }
    }
}

impl AudioConfig {
    fn validate(&self) -> Result<()> {
        if self.locator.trim().is_empty() {
            return Err(invalid("audio.locator", &self.locator).into());
        }
        Ok(())
    }
}
