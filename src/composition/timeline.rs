use crate::config::CompositionConfig;
use crate::error::{CompositionError, Result};
use crate::video::types::{RasterFrame, VideoSource};

/// A sampled moment of a source video
#[derive(Debug)]
pub struct Scene {
    /// Display label `MM:SS`, derived from the sample index
    pub timestamp: String,

    /// Human readable description
    pub description: String,

    /// The sampled still, owned by this scene
    pub image: RasterFrame,

    /// Whether the user picked this scene
    pub selected: bool,
}

impl Scene {
    /// Build the scene for the `index`-th sample of `source`
    pub fn from_sample(source: &VideoSource, index: usize, interval_ms: u64, image: RasterFrame) -> Self {
        let timestamp = format_timestamp(index, interval_ms);
        Self {
            description: format!("Scene from {} at {}", source.name(), timestamp),
            timestamp,
            image,
            selected: false,
        }
    }
}

/// `MM:SS` label of the `index`-th sample taken every `interval_ms`
pub fn format_timestamp(index: usize, interval_ms: u64) -> String {
    let seconds = index as u64 * interval_ms / 1000;
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Fixed timing of a composition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingModel {
    /// Output frames per second
    pub fps: u32,

    /// Screen time per scene
    pub seconds_per_scene: u32,

    /// Trailing frames of a scene that crossfade into the next
    pub transition_frames: u32,
}

impl Default for TimingModel {
    fn default() -> Self {
        Self {
            fps: 30,
            seconds_per_scene: 3,
            transition_frames: 15,
        }
    }
}

impl TimingModel {
    pub fn new(fps: u32, seconds_per_scene: u32, transition_frames: u32) -> Result<Self> {
        let timing = Self {
            fps,
            seconds_per_scene,
            transition_frames,
        };
        timing.validate()?;
        Ok(timing)
    }

    pub fn from_config(config: &CompositionConfig) -> Result<Self> {
        Self::new(config.fps, config.seconds_per_scene, config.transition_frames)
    }

    pub fn frames_per_scene(&self) -> u32 {
        self.fps * self.seconds_per_scene
    }

    /// First frame (within a scene) of the transition window
    pub fn transition_start(&self) -> u32 {
        self.frames_per_scene() - self.transition_frames
    }

    fn validate(&self) -> Result<()> {
        if self.fps == 0 || self.seconds_per_scene == 0 {
            return Err(CompositionError::InvalidTiming {
                details: format!("{} fps x {}s per scene", self.fps, self.seconds_per_scene),
            }
            .into());
        }

        if self.transition_frames >= self.frames_per_scene() {
            return Err(CompositionError::InvalidTiming {
                details: format!(
                    "transition of {} frames does not fit a {} frame scene",
                    self.transition_frames,
                    self.frames_per_scene()
                ),
            }
            .into());
        }

        Ok(())
    }
}

/// Selected scenes in selection order plus the timing model
#[derive(Debug, Clone)]
pub struct CompositionTimeline<'a> {
    scenes: Vec<&'a Scene>,
    timing: TimingModel,
}

impl<'a> CompositionTimeline<'a> {
    /// Scenes keep the order they were given in, never re-sorted by time
    pub fn new(scenes: Vec<&'a Scene>, timing: TimingModel) -> Result<Self> {
        if scenes.is_empty() {
            return Err(CompositionError::EmptyTimeline.into());
        }
        Ok(Self { scenes, timing })
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn timing(&self) -> &TimingModel {
        &self.timing
    }

    pub fn scene(&self, index: usize) -> Option<&'a Scene> {
        self.scenes.get(index).copied()
    }

    pub fn scenes(&self) -> &[&'a Scene] {
        &self.scenes
    }

    /// Exactly `len × fps × seconds_per_scene`
    pub fn total_frames(&self) -> u64 {
        self.scenes.len() as u64 * self.timing.frames_per_scene() as u64
    }

    /// Video duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.total_frames() as f64 / self.timing.fps as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn scene(label: &str) -> Scene {
        Scene {
            timestamp: label.to_string(),
            description: String::new(),
            image: RasterFrame::new(RgbImage::new(4, 4), 0),
            selected: true,
        }
    }

    #[test]
    fn test_timestamp_formatting() {
        assert_eq!(format_timestamp(0, 2000), "00:00");
        assert_eq!(format_timestamp(1, 2000), "00:02");
        assert_eq!(format_timestamp(29, 2000), "00:58");
        assert_eq!(format_timestamp(30, 2000), "01:00");
        assert_eq!(format_timestamp(31, 2000), "01:02");
        assert_eq!(format_timestamp(3000, 2000), "100:00");
    }

    #[test]
    fn test_scene_description() {
        let source = VideoSource::new("holiday.mp4", "/tmp/holiday.mp4");
        let scene = Scene::from_sample(&source, 31, 2000, RasterFrame::new(RgbImage::new(2, 2), 62000));

        assert_eq!(scene.timestamp, "01:02");
        assert_eq!(scene.description, "Scene from holiday.mp4 at 01:02");
        assert!(!scene.selected);
    }

    #[test]
    fn test_total_frames() {
        let scenes: Vec<Scene> = (0..4).map(|i| scene(&format!("00:0{}", i))).collect();
        let timing = TimingModel::default();

        for n in 1..=4 {
            let timeline = CompositionTimeline::new(scenes.iter().take(n).collect(), timing).unwrap();
            assert_eq!(timeline.total_frames(), n as u64 * 90);
        }
    }

    #[test]
    fn test_selection_order_is_kept() {
        let a = scene("00:10");
        let b = scene("00:02");
        let timeline = CompositionTimeline::new(vec![&a, &b], TimingModel::default()).unwrap();

        assert_eq!(timeline.scene(0).unwrap().timestamp, "00:10");
        assert_eq!(timeline.scene(1).unwrap().timestamp, "00:02");
        assert!(timeline.scene(2).is_none());
        assert_eq!(timeline.duration_secs(), 6.0);
    }

    #[test]
    fn test_empty_timeline_rejected() {
        assert!(CompositionTimeline::new(Vec::new(), TimingModel::default()).is_err());
    }

    #[test]
    fn test_transition_must_fit() {
        assert!(TimingModel::new(30, 3, 90).is_err());
        assert!(TimingModel::new(0, 3, 15).is_err());
        assert_eq!(TimingModel::new(30, 3, 15).unwrap().transition_start(), 75);
    }
}
