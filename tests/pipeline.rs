//! End-to-end analyse → select → compile runs against in-memory backends.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{Rgb, RgbImage};

use scene_reel::{
    audio::{AudioBuffer, AudioProvider},
    composition::{CompilationEngine, CompilationState, ImmediateScheduler},
    config::Config,
    error::{AudioError, CompositionError, EncodeError, ReelError, Result, SamplerError},
    progress::{CancellationToken, ProgressReporter},
    session::{Session, SessionStatus},
    video::{EncodedOutput, Encoder, FrameDecoder, SourceMetadata, VideoSource},
};

const NATIVE_W: u32 = 64;
const NATIVE_H: u32 = 36;

/// Durations per source name; unknown names fail metadata resolution
struct FakeDecoder {
    durations: HashMap<String, u64>,
    open: Option<u64>,
    captures: Vec<u64>,
    closes: usize,
}

impl FakeDecoder {
    fn new(durations: &[(&str, u64)]) -> Self {
        Self {
            durations: durations.iter().map(|(n, d)| (n.to_string(), *d)).collect(),
            open: None,
            captures: Vec::new(),
            closes: 0,
        }
    }
}

#[async_trait]
impl FrameDecoder for FakeDecoder {
    async fn open(&mut self, source: &VideoSource) -> Result<SourceMetadata> {
        let duration_ms = *self.durations.get(source.name()).ok_or_else(|| {
            SamplerError::MetadataUnavailable {
                name: source.name().to_string(),
                reason: "not a video".to_string(),
            }
        })?;

        self.open = Some(duration_ms);
        Ok(SourceMetadata {
            duration_ms,
            width: NATIVE_W,
            height: NATIVE_H,
            fps: 30.0,
        })
    }

    async fn capture(&mut self, time_ms: u64) -> Result<RgbImage> {
        self.captures.push(time_ms);
        let shade = (time_ms / 100 % 256) as u8;
        Ok(RgbImage::from_pixel(NATIVE_W, NATIVE_H, Rgb([shade, 0, 255 - shade])))
    }

    async fn close(&mut self) {
        self.open = None;
        self.closes += 1;
    }
}

struct FakeTrack {
    fail: bool,
    loads: Mutex<usize>,
}

impl FakeTrack {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            fail,
            loads: Mutex::new(0),
        })
    }
}

#[async_trait]
impl AudioProvider for FakeTrack {
    fn locator(&self) -> &str {
        "memory://track"
    }

    async fn load(&self) -> Result<AudioBuffer> {
        *self.loads.lock().unwrap() += 1;
        if self.fail {
            return Err(AudioError::FetchFailure {
                locator: self.locator().to_string(),
                reason: "connection refused".to_string(),
            }
            .into());
        }
        Ok(AudioBuffer::new(vec![0.1; 8000 * 2], 8000, 2))
    }
}

#[derive(Default)]
struct FakeEncoder {
    started: bool,
    audio_secs: Option<f64>,
    frames: u64,
    first_pixels: Vec<Rgb<u8>>,
    finished: bool,
    aborted: bool,
    cancel_after: Option<(u64, CancellationToken)>,
}

#[async_trait]
impl Encoder for FakeEncoder {
    async fn start(&mut self, audio: Option<&AudioBuffer>, _total_frames: u64) -> Result<()> {
        self.started = true;
        self.audio_secs = audio.map(|a| a.duration());
        Ok(())
    }

    async fn submit_frame(&mut self, frame: &RgbImage) -> Result<()> {
        if !self.started {
            return Err(EncodeError::NotRunning.into());
        }
        self.first_pixels.push(*frame.get_pixel(frame.width() / 2, frame.height() / 2));
        self.frames += 1;

        if let Some((after, token)) = &self.cancel_after {
            if self.frames == *after {
                token.cancel();
            }
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<EncodedOutput> {
        self.finished = true;
        Ok(EncodedOutput::from_chunks(
            vec![b"webm-header".to_vec(), b"clusters".to_vec()],
            "video/webm",
            "webm",
            self.frames,
        ))
    }

    async fn abort(&mut self) {
        self.aborted = true;
    }
}

#[derive(Default)]
struct Recorder {
    progress: Mutex<Vec<f64>>,
    states: Mutex<Vec<CompilationState>>,
}

impl ProgressReporter for Recorder {
    fn on_progress(&self, percent: f64) {
        self.progress.lock().unwrap().push(percent);
    }

    fn on_state(&self, state: CompilationState) {
        self.states.lock().unwrap().push(state);
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.output.width = 64;
    config.output.height = 36;
    config
}

fn sources(names: &[&str]) -> Vec<VideoSource> {
    names
        .iter()
        .map(|name| VideoSource::new(*name, format!("/videos/{}", name)))
        .collect()
}

#[tokio::test]
async fn test_analyze_labels_scenes_per_source() {
    let engine = CompilationEngine::new(test_config(), FakeTrack::new(false)).unwrap();
    let mut decoder = FakeDecoder::new(&[("a.mp4", 4000), ("b.mp4", 5999)]);
    let recorder = Recorder::default();

    let scenes = engine
        .analyze(&mut decoder, &sources(&["a.mp4", "b.mp4"]), &recorder)
        .await
        .unwrap();

    let labels: Vec<&str> = scenes.iter().map(|s| s.timestamp.as_str()).collect();
    assert_eq!(labels, vec!["00:00", "00:02", "00:04", "00:00", "00:02", "00:04"]);
    assert_eq!(scenes[4].description, "Scene from b.mp4 at 00:02");
    assert_eq!(decoder.captures, vec![0, 2000, 4000, 0, 2000, 4000]);
    assert_eq!(decoder.closes, 2);

    // Downscaled once at capture time
    assert_eq!(scenes[0].image.width(), NATIVE_W / 2);
    assert_eq!(scenes[0].image.height(), NATIVE_H / 2);

    let progress = recorder.progress.lock().unwrap();
    assert_eq!(progress.len(), 6);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*progress.last().unwrap(), 100.0);
}

#[tokio::test]
async fn test_two_scene_compilation() {
    let engine = CompilationEngine::new(test_config(), FakeTrack::new(false)).unwrap();
    let mut decoder = FakeDecoder::new(&[("a.mp4", 10_000)]);
    let scenes = engine
        .analyze(&mut decoder, &sources(&["a.mp4"]), &|_: f64| {})
        .await
        .unwrap();

    // Later scene first: selection order is playback order
    let selected = vec![&scenes[5], &scenes[0]];
    let mut encoder = FakeEncoder::default();
    let recorder = Recorder::default();

    let output = engine
        .generate(
            &selected,
            &mut encoder,
            &mut ImmediateScheduler,
            &recorder,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(output.frame_count(), 180);
    assert_eq!(output.bytes(), b"webm-headerclusters");
    assert_eq!(output.mime_type(), "video/webm");
    assert_eq!(output.file_name(1_700_000_000_000), "compilation-1700000000000.webm");
    assert!(encoder.finished && !encoder.aborted);
    assert_eq!(encoder.audio_secs, Some(1.0));

    // One progress value per frame, ending at exactly 100
    let progress = recorder.progress.lock().unwrap();
    assert_eq!(progress.len(), 180);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert!(progress[0] > 0.0);
    assert_eq!(progress[179], 100.0);

    assert_eq!(
        *recorder.states.lock().unwrap(),
        vec![
            CompilationState::Loading,
            CompilationState::Started,
            CompilationState::Rendering,
            CompilationState::Stopping,
            CompilationState::Finalized,
        ]
    );

    // Frame 0 shows the scene sampled at 10s, frame 179 the one at 0s
    let late = scenes[5].image.as_image().get_pixel(8, 4)[0];
    let early = scenes[0].image.as_image().get_pixel(8, 4)[0];
    assert!((encoder.first_pixels[0][0] as i32 - late as i32).abs() <= 1);
    assert!((encoder.first_pixels[179][0] as i32 - early as i32).abs() <= 1);
}

#[tokio::test]
async fn test_cancellation_aborts_without_output() {
    let engine = CompilationEngine::new(test_config(), FakeTrack::new(false)).unwrap();
    let mut decoder = FakeDecoder::new(&[("a.mp4", 2000)]);
    let scenes = engine
        .analyze(&mut decoder, &sources(&["a.mp4"]), &|_: f64| {})
        .await
        .unwrap();

    let token = CancellationToken::new();
    let mut encoder = FakeEncoder {
        cancel_after: Some((30, token.clone())),
        ..Default::default()
    };
    let recorder = Recorder::default();

    let result = engine
        .generate(&[&scenes[0], &scenes[1]], &mut encoder, &mut ImmediateScheduler, &recorder, &token)
        .await;

    assert!(matches!(result, Err(ReelError::Cancelled)));
    assert_eq!(encoder.frames, 30);
    assert!(encoder.aborted);
    assert!(!encoder.finished);
    assert_eq!(recorder.states.lock().unwrap().last(), Some(&CompilationState::Aborted));
}

#[tokio::test]
async fn test_audio_failure_aborts_before_start() {
    let track = FakeTrack::new(true);
    let engine = CompilationEngine::new(test_config(), track.clone()).unwrap();
    let mut decoder = FakeDecoder::new(&[("a.mp4", 0)]);
    let scenes = engine
        .analyze(&mut decoder, &sources(&["a.mp4"]), &|_: f64| {})
        .await
        .unwrap();
    assert_eq!(scenes.len(), 1);

    let mut encoder = FakeEncoder::default();
    let recorder = Recorder::default();
    let result = engine
        .generate(&[&scenes[0]], &mut encoder, &mut ImmediateScheduler, &recorder, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(ReelError::Audio(AudioError::FetchFailure { .. }))));
    assert!(!encoder.started);
    assert_eq!(encoder.frames, 0);
    assert!(recorder.progress.lock().unwrap().is_empty());
    assert_eq!(*track.loads.lock().unwrap(), 1);
    assert_eq!(
        *recorder.states.lock().unwrap(),
        vec![CompilationState::Loading, CompilationState::Aborted]
    );
}

/// Records whether the session reported busy while progress came in
struct BusyWatcher {
    status: Arc<Mutex<SessionStatus>>,
    busy_samples: Mutex<Vec<bool>>,
}

impl ProgressReporter for BusyWatcher {
    fn on_progress(&self, _percent: f64) {
        let busy = self.status.lock().unwrap().is_processing;
        self.busy_samples.lock().unwrap().push(busy);
    }
}

#[tokio::test]
async fn test_session_compiles_selection_and_resets() {
    let engine = CompilationEngine::new(test_config(), FakeTrack::new(false)).unwrap();
    let session = Session::new(engine);
    let watcher = Arc::new(BusyWatcher {
        status: session.status_handle(),
        busy_samples: Mutex::new(Vec::new()),
    });
    let mut session = session.with_observer(watcher.clone());

    let mut decoder = FakeDecoder::new(&[("a.mp4", 4000), ("b.mp4", 2000)]);
    let scenes = session
        .analyze_videos(&mut decoder, &sources(&["a.mp4", "b.mp4"]))
        .await
        .unwrap();
    assert_eq!(scenes.len(), 5);
    assert_eq!(session.status(), SessionStatus::default());

    session.toggle_scene(4);
    session.toggle_scene(1);
    let selected = session.selected_scenes();
    assert_eq!(selected[0].description, "Scene from b.mp4 at 00:02");
    assert_eq!(selected[1].description, "Scene from a.mp4 at 00:02");

    let mut encoder = FakeEncoder::default();
    let output = session
        .create_compilation(&selected, &mut encoder, &mut ImmediateScheduler, &CancellationToken::new())
        .await;

    assert_eq!(output.map(|o| o.frame_count()), Some(180));
    assert_eq!(session.status(), SessionStatus::default());

    let samples = watcher.busy_samples.lock().unwrap();
    assert_eq!(samples.len(), 5 + 180);
    assert!(samples.iter().all(|&busy| busy));
}

#[tokio::test]
async fn test_session_failure_resolves_to_none() {
    let engine = CompilationEngine::new(test_config(), FakeTrack::new(true)).unwrap();
    let mut session = Session::new(engine);
    let mut decoder = FakeDecoder::new(&[("a.mp4", 2000)]);
    session
        .analyze_videos(&mut decoder, &sources(&["a.mp4"]))
        .await
        .unwrap();
    session.select_scenes(&[1, 0]).unwrap();

    let mut encoder = FakeEncoder::default();
    let selected = session.selected_scenes();
    let output = session
        .create_compilation(&selected, &mut encoder, &mut ImmediateScheduler, &CancellationToken::new())
        .await;

    assert!(output.is_none());
    assert_eq!(session.status(), SessionStatus::default());

    // Empty selection fails the same way
    let output = session
        .create_compilation(&[], &mut encoder, &mut ImmediateScheduler, &CancellationToken::new())
        .await;
    assert!(output.is_none());
    assert!(!session.status().is_processing);
}

#[tokio::test]
async fn test_session_source_cap_and_bad_sources() {
    let engine = CompilationEngine::new(test_config(), FakeTrack::new(false)).unwrap();
    let mut session = Session::new(engine);
    let mut decoder = FakeDecoder::new(&[("a.mp4", 2000), ("b.mp4", 2000), ("c.mp4", 2000), ("d.mp4", 2000)]);

    let result = session
        .analyze_videos(&mut decoder, &sources(&["a.mp4", "b.mp4", "c.mp4", "d.mp4"]))
        .await;
    assert!(matches!(
        result,
        Err(ReelError::Composition(CompositionError::TooManySources { count: 4, max: 3 }))
    ));
    assert!(decoder.captures.is_empty());

    session
        .analyze_videos(&mut decoder, &sources(&["a.mp4"]))
        .await
        .unwrap();
    assert_eq!(session.scenes().len(), 2);

    // A source without metadata fails the analysis and keeps the old scenes
    let result = session
        .analyze_videos(&mut decoder, &sources(&["a.mp4", "notes.txt"]))
        .await;
    assert!(matches!(
        result,
        Err(ReelError::Sampler(SamplerError::MetadataUnavailable { .. }))
    ));
    assert_eq!(session.scenes().len(), 2);
    assert_eq!(session.status(), SessionStatus::default());
    assert!(decoder.open.is_none());
}
