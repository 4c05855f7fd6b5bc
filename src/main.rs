use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use scene_reel::{
    audio::LocatorAudioProvider,
    composition::{scheduler_for, CompilationEngine, CompilationState},
    config::Config,
    progress::{CancellationToken, ProgressReporter},
    session::Session,
    video::{EncoderSettings, FfmpegDecoder, FfmpegEncoder, VideoSource},
};

#[derive(Parser)]
#[command(
    name = "scene-reel",
    version,
    about = "Turn selected moments from your videos into one highlight reel",
    long_about = "Scene-Reel samples your videos every two seconds into scenes, then compiles the scenes you pick into a single WebM with slow zooms, crossfades and a background track."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (optional)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Sample videos and list the scenes found in them
    Analyze {
        /// Video files (at most three)
        #[arg(required = true)]
        videos: Vec<PathBuf>,

        /// Write one JPEG per scene into this directory
        #[arg(short, long)]
        thumbnails: Option<PathBuf>,
    },

    /// Sample videos and compile the selected scenes into one video
    Compile {
        /// Video files (at most three)
        #[arg(required = true)]
        videos: Vec<PathBuf>,

        /// Scene indices as listed by `analyze`, in playback order
        #[arg(short, long, value_delimiter = ',', required = true)]
        select: Vec<usize>,

        /// Directory the compilation is written to
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
}

/// Logs progress every 10 % and state changes at debug level
struct LogProgress {
    label: &'static str,
    last_decile: AtomicU32,
}

impl LogProgress {
    fn new(label: &'static str) -> Self {
        Self {
            label,
            last_decile: AtomicU32::new(0),
        }
    }
}

impl ProgressReporter for LogProgress {
    fn on_progress(&self, percent: f64) {
        let decile = (percent / 10.0).floor() as u32;
        if decile > self.last_decile.fetch_max(decile, Ordering::Relaxed) {
            info!("   {} {:.0}%", self.label, percent);
        }
    }

    fn on_state(&self, state: CompilationState) {
        tracing::debug!("   {} state: {}", self.label, state);
        if state == CompilationState::Loading {
            self.last_decile.store(0, Ordering::Relaxed);
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging, RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("Starting Scene-Reel v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };

    let audio = Arc::new(LocatorAudioProvider::new(config.audio.locator.clone()));
    let engine = CompilationEngine::new(config.clone(), audio)?;
    let mut session =
        Session::new(engine).with_observer(Arc::new(LogProgress::new("progress")));
    let mut decoder = FfmpegDecoder::new(config.output.ffmpeg.clone(), config.output.ffprobe.clone());

    match cli.command {
        Command::Analyze { videos, thumbnails } => {
            let sources = to_sources(&videos);
            let scenes = session
                .analyze_videos(&mut decoder, &sources)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;

            for (index, scene) in scenes.iter().enumerate() {
                println!("{:>4}  {}  {}", index, scene.timestamp, scene.description);
            }

            if let Some(dir) = thumbnails {
                write_thumbnails(&session, &dir)?;
            }
        }

        Command::Compile { videos, select, out } => {
            let sources = to_sources(&videos);
            session
                .analyze_videos(&mut decoder, &sources)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            session
                .select_scenes(&select)
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;

            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling compilation...");
                    ctrl_c.cancel();
                }
            });

            let mut encoder = FfmpegEncoder::new(EncoderSettings::from_config(
                &config.output,
                config.composition.fps,
            ));
            let mut scheduler =
                scheduler_for(config.composition.realtime_pacing, config.composition.fps);

            let selected = session.selected_scenes();
            let output = session
                .create_compilation(&selected, &mut encoder, scheduler.as_mut(), &cancel)
                .await
                .context("Compilation failed, see the log above")?;

            let path = output.save_to_dir(&out)?;
            info!("Compilation saved to: {:?}", path);
        }
    }

    Ok(())
}

fn to_sources(videos: &[PathBuf]) -> Vec<VideoSource> {
    videos
        .iter()
        .map(|path| {
            let source = VideoSource::from_path(path.clone());
            if !source.is_supported() {
                warn!("{} does not look like a supported video, trying anyway", source.name());
            }
            source
        })
        .collect()
}

fn write_thumbnails(session: &Session, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    for (index, scene) in session.scenes().iter().enumerate() {
        let path = dir.join(format!("scene-{:03}.jpg", index));
        scene
            .image
            .save_jpeg(&path)
            .with_context(|| format!("Failed to write {:?}", path))?;
    }
    info!("Wrote {} thumbnails to {:?}", session.scenes().len(), dir);
    Ok(())
}
