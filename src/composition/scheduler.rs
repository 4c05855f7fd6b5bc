use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Decides when the next composite frame may be produced.
///
/// Rendering awaits one tick per frame, so other tasks on the same runtime
/// (encoder output draining, cancellation) get a turn between frames.
#[async_trait]
pub trait FrameScheduler: Send {
    async fn next_tick(&mut self);
}

/// Renders as fast as the encoder accepts frames, yielding between them
#[derive(Debug, Default)]
pub struct ImmediateScheduler;

#[async_trait]
impl FrameScheduler for ImmediateScheduler {
    async fn next_tick(&mut self) {
        tokio::task::yield_now().await;
    }
}

/// Paces frames at a fixed rate, for encoders that consume in real time
pub struct PacedScheduler {
    interval: Interval,
}

impl PacedScheduler {
    pub fn new(fps: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl FrameScheduler for PacedScheduler {
    async fn next_tick(&mut self) {
        self.interval.tick().await;
    }
}

/// The scheduler matching the composition settings
pub fn scheduler_for(realtime_pacing: bool, fps: u32) -> Box<dyn FrameScheduler> {
    if realtime_pacing {
        Box::new(PacedScheduler::new(fps))
    } else {
        Box::new(ImmediateScheduler)
    }
}
