//! Caller-side processing session: busy flag, progress, analysed scenes and
//! the user's scene selection.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{error, info};

use crate::{
    composition::{CompilationEngine, CompilationState, FrameScheduler, Scene},
    error::{CompositionError, Result},
    progress::{CancellationToken, ProgressReporter},
    video::{EncodedOutput, Encoder, FrameDecoder, VideoSource},
};

/// Snapshot of what the session is doing
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SessionStatus {
    pub is_processing: bool,
    pub progress: f64,
}

/// Marks the session busy for as long as it lives, idle again on drop
struct BusyGuard<'a> {
    status: &'a Mutex<SessionStatus>,
}

impl<'a> BusyGuard<'a> {
    fn enter(status: &'a Mutex<SessionStatus>) -> Self {
        *lock(status) = SessionStatus {
            is_processing: true,
            progress: 0.0,
        };
        Self { status }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        *lock(self.status) = SessionStatus::default();
    }
}

/// Mirrors progress into the session status and forwards it to the observer
struct StatusReporter<'a> {
    status: &'a Mutex<SessionStatus>,
    observer: Option<&'a dyn ProgressReporter>,
}

impl ProgressReporter for StatusReporter<'_> {
    fn on_progress(&self, percent: f64) {
        lock(self.status).progress = percent;
        if let Some(observer) = self.observer {
            observer.on_progress(percent);
        }
    }

    fn on_state(&self, state: CompilationState) {
        if let Some(observer) = self.observer {
            observer.on_state(state);
        }
    }
}

fn lock(status: &Mutex<SessionStatus>) -> MutexGuard<'_, SessionStatus> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One user's analyse-select-compile workflow
pub struct Session {
    engine: CompilationEngine,
    status: Arc<Mutex<SessionStatus>>,
    observer: Option<Arc<dyn ProgressReporter>>,
    scenes: Vec<Scene>,
    selection: Vec<usize>,
}

impl Session {
    pub fn new(engine: CompilationEngine) -> Self {
        Self {
            engine,
            status: Arc::new(Mutex::new(SessionStatus::default())),
            observer: None,
            scenes: Vec::new(),
            selection: Vec::new(),
        }
    }

    /// Forward progress and state changes to `observer` as well
    pub fn with_observer(mut self, observer: Arc<dyn ProgressReporter>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn engine(&self) -> &CompilationEngine {
        &self.engine
    }

    pub fn status(&self) -> SessionStatus {
        *lock(&self.status)
    }

    /// Shared handle for watching the status from another task
    pub fn status_handle(&self) -> Arc<Mutex<SessionStatus>> {
        Arc::clone(&self.status)
    }

    /// Scenes of the last successful analysis
    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    fn reporter(&self) -> StatusReporter<'_> {
        StatusReporter {
            status: &self.status,
            observer: self.observer.as_deref(),
        }
    }

    /// Analyse up to `max_sources` videos, replacing the scene list and
    /// clearing the selection on success
    pub async fn analyze_videos<D>(&mut self, decoder: &mut D, sources: &[VideoSource]) -> Result<&[Scene]>
    where
        D: FrameDecoder + ?Sized,
    {
        let max = self.engine.config().sampling.max_sources;
        if sources.len() > max {
            return Err(CompositionError::TooManySources {
                count: sources.len(),
                max,
            }
            .into());
        }

        let result = {
            let _busy = BusyGuard::enter(&self.status);
            self.engine.analyze(decoder, sources, &self.reporter()).await
        };

        match result {
            Ok(scenes) => {
                self.scenes = scenes;
                self.selection.clear();
                Ok(&self.scenes)
            }
            Err(e) => {
                error!("Error processing videos: {}", e);
                Err(e)
            }
        }
    }

    /// Flip the selection of scene `index`; returns the new state, or `None`
    /// for an unknown index. Newly selected scenes go to the end of the order.
    pub fn toggle_scene(&mut self, index: usize) -> Option<bool> {
        let scene = self.scenes.get_mut(index)?;
        scene.selected = !scene.selected;

        if scene.selected {
            self.selection.push(index);
        } else {
            self.selection.retain(|&i| i != index);
        }
        Some(scene.selected)
    }

    /// Select scenes in the given order, dropping any previous selection
    pub fn select_scenes(&mut self, indices: &[usize]) -> Result<()> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.scenes.len()) {
            return Err(CompositionError::UnknownScene {
                index: bad,
                count: self.scenes.len(),
            }
            .into());
        }

        self.clear_selection();
        for &index in indices {
            if !self.scenes[index].selected {
                self.toggle_scene(index);
            }
        }
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        for scene in &mut self.scenes {
            scene.selected = false;
        }
        self.selection.clear();
    }

    /// Selected scenes in the order they were picked
    pub fn selected_scenes(&self) -> Vec<&Scene> {
        self.selection.iter().filter_map(|&i| self.scenes.get(i)).collect()
    }

    /// Compile `scenes`; `None` if anything failed along the way.
    ///
    /// The failure is logged once and the session is idle again afterwards,
    /// whatever the outcome.
    pub async fn create_compilation(
        &self,
        scenes: &[&Scene],
        encoder: &mut dyn Encoder,
        scheduler: &mut dyn FrameScheduler,
        cancel: &CancellationToken,
    ) -> Option<EncodedOutput> {
        let _busy = BusyGuard::enter(&self.status);
        let reporter = self.reporter();

        match self.engine.generate(scenes, encoder, scheduler, &reporter, cancel).await {
            Ok(output) => {
                info!("Compilation ready: {} bytes", output.len());
                Some(output)
            }
            Err(e) => {
                error!("Error creating compilation: {}", e);
                None
            }
        }
    }
}
