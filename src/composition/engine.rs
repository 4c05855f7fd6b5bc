use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    audio::{AudioBuffer, AudioProvider},
    composition::{
        compositor::Compositor,
        scheduler::FrameScheduler,
        timeline::{CompositionTimeline, Scene, TimingModel},
    },
    config::Config,
    error::{CompositionError, Result},
    progress::{percent, CancellationToken, ProgressReporter},
    video::{EncodedOutput, Encoder, FrameDecoder, FrameSampler, VideoSource},
};

/// Lifecycle of one compilation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilationState {
    Idle,
    /// Scene images and the background track are being made ready
    Loading,
    /// Encoder running with the audio attached
    Started,
    /// Composite frames are being produced
    Rendering,
    /// Encoder is flushing
    Stopping,
    Finalized,
    Aborted,
}

impl fmt::Display for CompilationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Started => "started",
            Self::Rendering => "rendering",
            Self::Stopping => "stopping",
            Self::Finalized => "finalized",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Tracks the current state and announces transitions
struct StateMachine<'p> {
    state: CompilationState,
    reporter: &'p dyn ProgressReporter,
}

impl<'p> StateMachine<'p> {
    fn new(reporter: &'p dyn ProgressReporter) -> Self {
        Self {
            state: CompilationState::Idle,
            reporter,
        }
    }

    fn enter(&mut self, next: CompilationState) {
        debug!("Compilation state: {} -> {}", self.state, next);
        self.state = next;
        self.reporter.on_state(next);
    }
}

/// Main engine that turns source videos into scenes and selected scenes into
/// a finished compilation
///
/// The engine follows a clear pipeline:
/// 1. Analysis - sample every source at a fixed interval into Scenes
/// 2. Loading - scene images and background audio made ready together
/// 3. Rendering - each composite frame rendered and handed to the encoder
/// 4. Finalization - the encoder flushes into one EncodedOutput
pub struct CompilationEngine {
    config: Config,
    sampler: FrameSampler,
    timing: TimingModel,
    audio: Arc<dyn AudioProvider>,
}

impl CompilationEngine {
    /// Create an engine from a validated configuration and the background
    /// track provider
    pub fn new(config: Config, audio: Arc<dyn AudioProvider>) -> Result<Self> {
        config.validate()?;
        let sampler = FrameSampler::from_config(&config.sampling)?;
        let timing = TimingModel::from_config(&config.composition)?;

        Ok(Self {
            config,
            sampler,
            timing,
            audio,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn timing(&self) -> &TimingModel {
        &self.timing
    }

    // ==========================================
    // ANALYSIS
    // ==========================================

    /// Sample every source into Scenes, in source order then time order.
    ///
    /// Sources are decoded one after another; progress covers all of them.
    pub async fn analyze<D>(
        &self,
        decoder: &mut D,
        sources: &[VideoSource],
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<Scene>>
    where
        D: FrameDecoder + ?Sized,
    {
        info!("🔍 Analyzing {} source(s)...", sources.len());

        let source_count = sources.len() as f64;
        let mut scenes = Vec::new();

        for (i, source) in sources.iter().enumerate() {
            let mut sampling = self.sampler.open(&mut *decoder, source).await?;
            let total = sampling.total_frames();
            let mut index = 0usize;

            while let Some(frame) = sampling.next_frame().await {
                let frame = frame?;
                scenes.push(Scene::from_sample(source, index, self.sampler.interval_ms(), frame));
                index += 1;

                let within = percent(index as u64, total) / 100.0;
                progress.on_progress((i as f64 + within) / source_count * 100.0);
            }

            debug!("   {} -> {} scenes", source.name(), index);
        }

        info!("   ✅ Analysis complete: {} scenes", scenes.len());
        Ok(scenes)
    }

    // ==========================================
    // GENERATION
    // ==========================================

    /// Compile the selected scenes, in the given order, into one container.
    ///
    /// Any failure aborts the encoder and returns the error; no partial
    /// output is ever produced.
    pub async fn generate(
        &self,
        scenes: &[&Scene],
        encoder: &mut dyn Encoder,
        scheduler: &mut dyn FrameScheduler,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<EncodedOutput> {
        let mut machine = StateMachine::new(progress);
        let mut encoder_started = false;

        let result = self
            .run(scenes, encoder, scheduler, progress, cancel, &mut machine, &mut encoder_started)
            .await;

        match result {
            Ok(output) => {
                machine.enter(CompilationState::Finalized);
                info!(
                    "🎉 Compilation complete: {} frames, {} bytes ({})",
                    output.frame_count(),
                    output.len(),
                    output.mime_type()
                );
                Ok(output)
            }
            Err(e) => {
                if encoder_started {
                    encoder.abort().await;
                }
                warn!("Compilation aborted during {}: {}", machine.state, e);
                machine.enter(CompilationState::Aborted);
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run(
        &self,
        scenes: &[&Scene],
        encoder: &mut dyn Encoder,
        scheduler: &mut dyn FrameScheduler,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
        machine: &mut StateMachine<'_>,
        encoder_started: &mut bool,
    ) -> Result<EncodedOutput> {
        let timeline = CompositionTimeline::new(scenes.to_vec(), self.timing)?;
        info!(
            "🎬 Compiling {} scene(s): {} frames, {:.1}s",
            timeline.len(),
            timeline.total_frames(),
            timeline.duration_secs()
        );

        // Loading: images and audio made ready together
        machine.enter(CompilationState::Loading);
        let (_, track) = tokio::try_join!(images_ready(&timeline), self.audio.load())?;
        let track = self.fit_audio(&track, timeline.duration_secs());

        // Started: encoder and audio begin together
        cancel.check()?;
        encoder.start(Some(&track), timeline.total_frames()).await?;
        *encoder_started = true;
        machine.enter(CompilationState::Started);

        // Rendering
        machine.enter(CompilationState::Rendering);
        let output = &self.config.output;
        let compositor = Compositor::new(&timeline, output.width, output.height);
        let total = compositor.total_frames();
        let mut canvas = compositor.new_canvas();

        for k in 0..total {
            cancel.check()?;
            scheduler.next_tick().await;

            compositor.render(k, &mut canvas)?;
            encoder.submit_frame(&canvas).await?;
            progress.on_progress(percent(k + 1, total));
        }

        // Stopping
        machine.enter(CompilationState::Stopping);
        encoder.finish().await
    }

    fn fit_audio(&self, track: &AudioBuffer, video_secs: f64) -> AudioBuffer {
        let fit = self.config.audio.fit;
        debug!(
            "Fitting {:.1}s track to {:.1}s of video ({:?})",
            track.duration(),
            video_secs,
            fit
        );
        track.fitted(fit, video_secs)
    }
}

async fn images_ready(timeline: &CompositionTimeline<'_>) -> Result<()> {
    for (index, scene) in timeline.scenes().iter().enumerate() {
        if scene.image.width() == 0 || scene.image.height() == 0 {
            return Err(CompositionError::EmptyImage { index }.into());
        }
    }
    Ok(())
}
