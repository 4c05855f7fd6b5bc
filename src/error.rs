use thiserror::Error;

/// Main error type for the scene-reel library
#[derive(Error, Debug)]
pub enum ReelError {
    #[error("Frame sampling error: {0}")]
    Sampler(#[from] SamplerError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Composition error: {0}")]
    Composition(#[from] CompositionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Compilation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Frame sampling errors
#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Metadata unavailable for {name}: {reason}")]
    MetadataUnavailable { name: String, reason: String },

    #[error("Seek to {time_ms}ms failed in {name}: {reason}")]
    SeekFailure {
        name: String,
        time_ms: u64,
        reason: String,
    },

    #[error("Invalid sampling interval: {interval_ms}ms")]
    InvalidInterval { interval_ms: u64 },
}

/// Background audio errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to fetch audio from {locator}: {reason}")]
    FetchFailure { locator: String, reason: String },

    #[error("Failed to decode audio from {locator}: {reason}")]
    DecodeFailure { locator: String, reason: String },
}

/// Encoder errors
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Encoding failed: {reason}")]
    EncodeFailure { reason: String },

    #[error("Frame size mismatch: got {got_width}x{got_height}, expected {width}x{height}")]
    FrameSizeMismatch {
        got_width: u32,
        got_height: u32,
        width: u32,
        height: u32,
    },

    #[error("Encoder is not running")]
    NotRunning,
}

/// Composition errors
#[derive(Error, Debug)]
pub enum CompositionError {
    #[error("No scenes selected")]
    EmptyTimeline,

    #[error("Too many sources: {count} (maximum {max})")]
    TooManySources { count: usize, max: usize },

    #[error("Frame {index} is outside the timeline ({total} frames)")]
    FrameOutOfRange { index: u64, total: u64 },

    #[error("No scene {index} (only {count} analysed)")]
    UnknownScene { index: usize, count: usize },

    #[error("Scene {index} has an empty image")]
    EmptyImage { index: usize },

    #[error("Invalid timing: {details}")]
    InvalidTiming { details: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using ReelError
pub type Result<T> = std::result::Result<T, ReelError>;

impl ReelError {
    /// Whether this is the cancellation signal rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if a fresh attempt might succeed.
    ///
    /// Nothing is retried automatically; this only tells the caller whether
    /// offering a retry makes sense.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::Audio(AudioError::FetchFailure { .. }) => true,
            Self::Cancelled => true,
            _ => false,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Sampler(SamplerError::MetadataUnavailable { name, .. }) => {
                format!("Could not read video '{}'. Please check the file is a supported video.", name)
            }
            Self::Audio(AudioError::FetchFailure { locator, .. }) => {
                format!("Could not download the background track from '{}'.", locator)
            }
            Self::Composition(CompositionError::EmptyTimeline) => {
                "Select at least one scene before generating a compilation.".to_string()
            }
            Self::Composition(CompositionError::TooManySources { max, .. }) => {
                format!("Please upload at most {} videos.", max)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions_wrap_domain_errors() {
        let err: ReelError = SamplerError::SeekFailure {
            name: "a.mp4".to_string(),
            time_ms: 4000,
            reason: "no frame".to_string(),
        }
        .into();
        assert!(matches!(err, ReelError::Sampler(SamplerError::SeekFailure { time_ms: 4000, .. })));
        assert!(err.to_string().contains("4000ms"));
    }

    #[test]
    fn test_recoverability() {
        let fetch: ReelError = AudioError::FetchFailure {
            locator: "https://example.com/a.mp3".to_string(),
            reason: "timeout".to_string(),
        }
        .into();
        assert!(fetch.is_recoverable());

        let decode: ReelError = AudioError::DecodeFailure {
            locator: "a.mp3".to_string(),
            reason: "garbage".to_string(),
        }
        .into();
        assert!(!decode.is_recoverable());
        assert!(ReelError::Cancelled.is_cancelled());
    }

    #[test]
    fn test_user_message_for_empty_selection() {
        let err: ReelError = CompositionError::EmptyTimeline.into();
        assert!(err.user_message().contains("at least one scene"));
    }
}
