//! # Scene-Reel
//!
//! Turn selected moments from your videos into a single highlight reel with a
//! slow zoom, crossfades and a background track.
//!
//! Videos are sampled every two seconds into still Scenes. The user picks
//! scenes in any order and the engine renders three seconds of motion per
//! scene, crossfades into the next one over the last half second and encodes
//! everything with the background track into one WebM container.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use scene_reel::{
//!     audio::LocatorAudioProvider,
//!     composition::{CompilationEngine, ImmediateScheduler},
//!     config::Config,
//!     progress::CancellationToken,
//!     video::{EncoderSettings, FfmpegDecoder, FfmpegEncoder, VideoSource},
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::default();
//! let audio = Arc::new(LocatorAudioProvider::new(config.audio.locator.clone()));
//! let engine = CompilationEngine::new(config.clone(), audio)?;
//!
//! let mut decoder = FfmpegDecoder::default();
//! let sources = vec![VideoSource::from_path("holiday.mp4")];
//! let scenes = engine.analyze(&mut decoder, &sources, &|p: f64| println!("{p:.0}%")).await?;
//!
//! let selected = vec![&scenes[3], &scenes[0]];
//! let mut encoder = FfmpegEncoder::new(EncoderSettings::from_config(&config.output, config.composition.fps));
//! let output = engine
//!     .generate(&selected, &mut encoder, &mut ImmediateScheduler, &|_: f64| {}, &CancellationToken::new())
//!     .await?;
//!
//! output.save_to_dir("out/")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`video`] - Frame sampling from sources and container encoding
//! - [`audio`] - Background track fetching and decoding
//! - [`composition`] - Timeline, per-frame compositing and the compilation engine
//! - [`session`] - Busy/progress state and scene selection for a caller
//! - [`config`] - Configuration management

pub mod audio;
pub mod composition;
pub mod config;
pub mod error;
pub mod progress;
pub mod session;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    composition::{CompilationEngine, CompilationState, Scene},
    config::Config,
    error::{ReelError, Result},
    progress::{CancellationToken, ProgressReporter},
    session::{Session, SessionStatus},
};
