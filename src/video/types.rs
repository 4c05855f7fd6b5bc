use std::fmt;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{ImageFormat, RgbImage};

/// A decoded still image captured from a video source.
///
/// Frames are downscaled once when captured and are immutable afterwards.
#[derive(Clone)]
pub struct RasterFrame {
    image: RgbImage,
    timestamp_ms: u64,
}

impl RasterFrame {
    /// Wrap an already-downscaled image captured at `timestamp_ms`
    pub fn new(image: RgbImage, timestamp_ms: u64) -> Self {
        Self { image, timestamp_ms }
    }

    /// Downscale a native-resolution capture by `factor` and wrap it
    pub fn capture(native: &RgbImage, factor: f32, timestamp_ms: u64) -> Self {
        let width = ((native.width() as f32 * factor).round() as u32).max(1);
        let height = ((native.height() as f32 * factor).round() as u32).max(1);

        let image = if width == native.width() && height == native.height() {
            native.clone()
        } else {
            image::imageops::resize(native, width, height, FilterType::Triangle)
        };

        Self::new(image, timestamp_ms)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Capture time relative to the start of the source
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn as_image(&self) -> &RgbImage {
        &self.image
    }

    /// Save the frame as a JPEG thumbnail
    pub fn save_jpeg<P: AsRef<Path>>(&self, path: P) -> Result<(), image::ImageError> {
        self.image.save_with_format(path, ImageFormat::Jpeg)
    }
}

impl fmt::Debug for RasterFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RasterFrame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("timestamp_ms", &self.timestamp_ms)
            .finish()
    }
}

/// A video handed over by the upload collaborator
#[derive(Debug, Clone)]
pub struct VideoSource {
    name: String,
    path: PathBuf,
}

impl VideoSource {
    pub fn new<S: Into<String>, P: Into<PathBuf>>(name: S, path: P) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Use the file name as display name
    pub fn from_path<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("video")
            .to_string();
        Self { name, path }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the extension looks like a supported video container
    pub fn is_supported(&self) -> bool {
        matches!(
            self.path.extension().and_then(|ext| ext.to_str()),
            Some(ext) if matches!(
                ext.to_lowercase().as_str(),
                "mp4" | "avi" | "mov" | "mkv" | "webm" | "m4v"
            )
        )
    }
}

/// Facts about a source that are only known once it has been opened
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceMetadata {
    /// Duration in milliseconds
    pub duration_ms: u64,

    /// Native width
    pub width: u32,

    /// Native height
    pub height: u32,

    /// Native frame rate
    pub fps: f64,
}
