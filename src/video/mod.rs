//! # Video Module
//!
//! Frame sampling from source videos and encoding of the final container.

pub mod decoder;
pub mod encoder;
pub mod sampler;
pub mod types;

pub use decoder::FfmpegDecoder;
pub use encoder::{EncodedOutput, Encoder, EncoderSettings, FfmpegEncoder};
pub use sampler::{FrameDecoder, FrameSampler, FrameSampling};
pub use types::{RasterFrame, SourceMetadata, VideoSource};
