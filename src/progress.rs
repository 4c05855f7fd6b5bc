//! Progress reporting and cancellation shared by analysis and compilation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::composition::CompilationState;
use crate::error::{ReelError, Result};

/// Receives completion updates from a long-running operation.
///
/// Percentages are in `[0, 100]` and never decrease within one operation.
pub trait ProgressReporter: Send + Sync {
    fn on_progress(&self, percent: f64);

    /// Called on every compilation state transition
    fn on_state(&self, state: CompilationState) {
        let _ = state;
    }
}

impl<F> ProgressReporter for F
where
    F: Fn(f64) + Send + Sync,
{
    fn on_progress(&self, percent: f64) {
        self(percent)
    }
}

/// Percentage of `done` out of `total`, exactly 100 when `done == total`
pub fn percent(done: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    done as f64 / total as f64 * 100.0
}

/// Cooperative cancellation flag, checked once per rendered frame.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// `Err(ReelError::Cancelled)` once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ReelError::Cancelled)
        } else {
            Ok(())
        }
    }
}
