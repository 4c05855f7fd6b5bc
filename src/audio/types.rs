use std::path::Path;

use serde::{Deserialize, Serialize};

/// Decoded background track
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Interleaved samples in `[-1.0, 1.0]`
    samples: Vec<f32>,

    /// Sample rate in Hz
    sample_rate: u32,

    /// Number of channels (1 = mono, 2 = stereo)
    channels: u16,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels: channels.max(1),
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of sample frames (one sample per channel)
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// A new buffer fitted to `target_secs` of video according to `fit`
    pub fn fitted(&self, fit: AudioFit, target_secs: f64) -> AudioBuffer {
        let channels = self.channels as usize;
        let target_frames = (target_secs * self.sample_rate as f64).round() as usize;
        let target_len = target_frames * channels;

        let samples = match fit {
            AudioFit::Native => self.samples.clone(),
            AudioFit::Trim => {
                let mut samples: Vec<f32> =
                    self.samples.iter().take(target_len).copied().collect();
                samples.resize(target_len, 0.0);
                samples
            }
            AudioFit::Loop => {
                if self.samples.is_empty() {
                    vec![0.0; target_len]
                } else {
                    self.samples.iter().cycle().take(target_len).copied().collect()
                }
            }
        };

        AudioBuffer::new(samples, self.sample_rate, self.channels)
    }

    /// Write the buffer as a 32-bit float WAV file
    pub fn write_wav<P: AsRef<Path>>(&self, path: P) -> Result<(), hound::Error> {
        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };

        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()
    }
}

/// How the background track is matched to the video length.
///
/// The track always starts at output time 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFit {
    /// Attach the track unchanged, whatever its length
    #[default]
    Native,

    /// Cut the track at the video end, pad with silence when it is shorter
    Trim,

    /// Repeat the track until the video end
    Loop,
}
