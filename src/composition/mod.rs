//! # Composition
//!
//! Turns an ordered selection of scenes into the frames of the final video:
//! a slow zoom and pan over each scene, a crossfade into the next one and a
//! timestamp label, then drives the encoder through a compilation request.

pub mod compositor;
pub mod engine;
pub mod overlay;
pub mod scheduler;
pub mod timeline;

// Re-exports for convenience
pub use compositor::{Compositor, FramePlan, Layer, Placement};
pub use engine::{CompilationEngine, CompilationState};
pub use scheduler::{scheduler_for, FrameScheduler, ImmediateScheduler, PacedScheduler};
pub use timeline::{format_timestamp, CompositionTimeline, Scene, TimingModel};
