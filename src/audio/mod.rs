//! # Background Audio Module
//!
//! Fetches the background track for a compilation and decodes it into raw
//! PCM.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use scene_reel::audio::{AudioProvider, LocatorAudioProvider};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let provider = LocatorAudioProvider::new("music/theme.mp3");
//! let track = provider.load().await?;
//!
//! println!("{:.1}s at {} Hz", track.duration(), track.sample_rate());
//! # Ok(())
//! # }
//! ```

pub mod loader;
pub mod provider;
pub mod types;

pub use loader::AudioLoader;
pub use provider::{AudioProvider, LocatorAudioProvider};
pub use types::{AudioBuffer, AudioFit};
