use async_trait::async_trait;
use image::RgbImage;
use tracing::{debug, info};

use crate::config::SamplingConfig;
use crate::error::{Result, SamplerError};
use crate::progress::{percent, ProgressReporter};
use crate::video::types::{RasterFrame, SourceMetadata, VideoSource};

/// Decoder capability the sampler drives.
///
/// One source is open at a time. `close` releases everything tied to it and
/// must be safe to call more than once.
#[async_trait]
pub trait FrameDecoder: Send {
    /// Open a source and resolve its metadata
    async fn open(&mut self, source: &VideoSource) -> Result<SourceMetadata>;

    /// Seek to `time_ms` and return the decoded picture at native resolution
    async fn capture(&mut self, time_ms: u64) -> Result<RgbImage>;

    /// Release the open source
    async fn close(&mut self);
}

/// Extracts still frames from a source at a fixed interval
#[derive(Debug, Clone, Copy)]
pub struct FrameSampler {
    interval_ms: u64,
    downscale: f32,
}

impl FrameSampler {
    pub fn new(interval_ms: u64, downscale: f32) -> Result<Self> {
        if interval_ms == 0 {
            return Err(SamplerError::InvalidInterval { interval_ms }.into());
        }
        Ok(Self { interval_ms, downscale })
    }

    pub fn from_config(config: &SamplingConfig) -> Result<Self> {
        Self::new(config.interval_ms, config.downscale)
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Number of sample points for a source of `duration_ms`
    pub fn frame_count(&self, duration_ms: u64) -> u64 {
        duration_ms / self.interval_ms + 1
    }

    /// Open `source` and return the lazy frame sequence.
    ///
    /// The decoder is closed again if metadata cannot be resolved.
    pub async fn open<'d, D>(
        &self,
        decoder: &'d mut D,
        source: &VideoSource,
    ) -> Result<FrameSampling<'d, D>>
    where
        D: FrameDecoder + ?Sized,
    {
        let metadata = match decoder.open(source).await {
            Ok(metadata) => metadata,
            Err(e) => {
                decoder.close().await;
                return Err(e);
            }
        };

        info!(
            "Sampling {} every {}ms ({}x{}, {}ms, {} frames)",
            source.name(),
            self.interval_ms,
            metadata.width,
            metadata.height,
            metadata.duration_ms,
            self.frame_count(metadata.duration_ms)
        );

        Ok(FrameSampling {
            decoder,
            source_name: source.name().to_string(),
            metadata,
            interval_ms: self.interval_ms,
            downscale: self.downscale,
            next_time_ms: 0,
            emitted: 0,
            closed: false,
        })
    }

    /// Sample a whole source, reporting per-frame progress
    pub async fn sample_all<D>(
        &self,
        decoder: &mut D,
        source: &VideoSource,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<RasterFrame>>
    where
        D: FrameDecoder + ?Sized,
    {
        let mut sampling = self.open(decoder, source).await?;
        let total = sampling.total_frames();
        let mut frames = Vec::new();

        while let Some(frame) = sampling.next_frame().await {
            frames.push(frame?);
            progress.on_progress(percent(frames.len() as u64, total));
        }

        Ok(frames)
    }
}

/// Lazy, finite, non-restartable sequence of frames from one source.
///
/// Frames come out in strictly increasing time order; the next seek only
/// starts after the previous capture finished. The decoder is closed as soon
/// as the sequence is exhausted or a capture fails.
pub struct FrameSampling<'d, D: FrameDecoder + ?Sized> {
    decoder: &'d mut D,
    source_name: String,
    metadata: SourceMetadata,
    interval_ms: u64,
    downscale: f32,
    next_time_ms: u64,
    emitted: u64,
    closed: bool,
}

impl<'d, D: FrameDecoder + ?Sized> FrameSampling<'d, D> {
    /// Total number of frames this sequence yields when it runs to completion
    pub fn total_frames(&self) -> u64 {
        self.metadata.duration_ms / self.interval_ms + 1
    }

    /// Frames yielded so far
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Capture the next frame, `None` once the sequence is over
    pub async fn next_frame(&mut self) -> Option<Result<RasterFrame>> {
        if self.closed {
            return None;
        }

        let time_ms = self.next_time_ms;
        if time_ms > self.metadata.duration_ms {
            self.close().await;
            return None;
        }

        match self.decoder.capture(time_ms).await {
            Ok(native) => {
                debug!("Captured {} at {}ms", self.source_name, time_ms);
                self.next_time_ms = time_ms + self.interval_ms;
                self.emitted += 1;
                Some(Ok(RasterFrame::capture(&native, self.downscale, time_ms)))
            }
            Err(e) => {
                self.close().await;
                Some(Err(e))
            }
        }
    }

    /// Stop early and release the decoder
    pub async fn close(&mut self) {
        if !self.closed {
            self.decoder.close().await;
            self.closed = true;
            debug!("Released decoder for {} after {} frames", self.source_name, self.emitted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReelError;
    use image::Rgb;
    use std::sync::Mutex;

    /// Synthetic decoder: the red channel encodes the capture time in seconds
    struct FakeDecoder {
        duration_ms: u64,
        fail_at: Option<u64>,
        fail_open: bool,
        captured: Vec<u64>,
        closes: usize,
    }

    impl FakeDecoder {
        fn new(duration_ms: u64) -> Self {
            Self {
                duration_ms,
                fail_at: None,
                fail_open: false,
                captured: Vec::new(),
                closes: 0,
            }
        }
    }

    #[async_trait]
    impl FrameDecoder for FakeDecoder {
        async fn open(&mut self, source: &VideoSource) -> Result<SourceMetadata> {
            if self.fail_open {
                return Err(SamplerError::MetadataUnavailable {
                    name: source.name().to_string(),
                    reason: "corrupt".to_string(),
                }
                .into());
            }
            Ok(SourceMetadata {
                duration_ms: self.duration_ms,
                width: 64,
                height: 36,
                fps: 30.0,
            })
        }

        async fn capture(&mut self, time_ms: u64) -> Result<RgbImage> {
            if self.fail_at == Some(time_ms) {
                return Err(SamplerError::SeekFailure {
                    name: "fake".to_string(),
                    time_ms,
                    reason: "unresolved".to_string(),
                }
                .into());
            }
            self.captured.push(time_ms);
            Ok(RgbImage::from_pixel(64, 36, Rgb([(time_ms / 1000) as u8, 0, 0])))
        }

        async fn close(&mut self) {
            self.closes += 1;
        }
    }

    fn source() -> VideoSource {
        VideoSource::new("clip.mp4", "clip.mp4")
    }

    #[tokio::test]
    async fn test_frame_count_and_times() {
        let sampler = FrameSampler::new(2000, 0.5).unwrap();

        for (duration, expected) in [(0u64, 1usize), (1999, 1), (2000, 2), (9500, 5), (10000, 6)] {
            let mut decoder = FakeDecoder::new(duration);
            let frames = sampler
                .sample_all(&mut decoder, &source(), &|_: f64| {})
                .await
                .unwrap();

            assert_eq!(frames.len(), expected, "duration {duration}");
            assert_eq!(frames.len() as u64, sampler.frame_count(duration));
            let times: Vec<u64> = frames.iter().map(|f| f.timestamp_ms()).collect();
            let expected_times: Vec<u64> = (0..expected as u64).map(|i| i * 2000).collect();
            assert_eq!(times, expected_times);
            assert_eq!(decoder.closes, 1);
        }
    }

    #[tokio::test]
    async fn test_frames_are_downscaled() {
        let sampler = FrameSampler::new(1000, 0.5).unwrap();
        let mut decoder = FakeDecoder::new(3000);
        let frames = sampler.sample_all(&mut decoder, &source(), &|_: f64| {}).await.unwrap();

        assert!(frames.iter().all(|f| f.width() == 32 && f.height() == 18));
        assert_eq!(frames[3].as_image().get_pixel(0, 0)[0], 3);
    }

    #[tokio::test]
    async fn test_sequence_is_lazy_and_not_restartable() {
        let sampler = FrameSampler::new(1000, 0.5).unwrap();
        let mut decoder = FakeDecoder::new(2000);
        {
            let mut sampling = sampler.open(&mut decoder, &source()).await.unwrap();
            assert_eq!(sampling.total_frames(), 3);
            assert_eq!(sampling.emitted(), 0);

            assert!(sampling.next_frame().await.unwrap().is_ok());
            assert_eq!(sampling.emitted(), 1);
            assert!(sampling.next_frame().await.unwrap().is_ok());
            assert!(sampling.next_frame().await.unwrap().is_ok());
            assert!(sampling.next_frame().await.is_none());
            assert!(sampling.next_frame().await.is_none());
        }
        assert_eq!(decoder.captured, vec![0, 1000, 2000]);
        assert_eq!(decoder.closes, 1);
    }

    #[tokio::test]
    async fn test_seek_failure_releases_decoder() {
        let sampler = FrameSampler::new(2000, 0.5).unwrap();
        let mut decoder = FakeDecoder::new(10000);
        decoder.fail_at = Some(4000);

        let result = sampler.sample_all(&mut decoder, &source(), &|_: f64| {}).await;
        assert!(matches!(
            result,
            Err(ReelError::Sampler(SamplerError::SeekFailure { time_ms: 4000, .. }))
        ));
        assert_eq!(decoder.captured, vec![0, 2000]);
        assert_eq!(decoder.closes, 1);
    }

    #[tokio::test]
    async fn test_huge_reported_duration_fails_on_first_bad_seek() {
        let sampler = FrameSampler::new(2000, 0.5).unwrap();
        let mut decoder = FakeDecoder::new(u64::MAX / 4);
        decoder.fail_at = Some(2000);

        let result = sampler.sample_all(&mut decoder, &source(), &|_: f64| {}).await;
        assert!(matches!(
            result,
            Err(ReelError::Sampler(SamplerError::SeekFailure { time_ms: 2000, .. }))
        ));
        assert_eq!(decoder.captured, vec![0]);
        assert_eq!(decoder.closes, 1);
    }

    #[tokio::test]
    async fn test_metadata_failure_releases_decoder() {
        let sampler = FrameSampler::new(2000, 0.5).unwrap();
        let mut decoder = FakeDecoder::new(10000);
        decoder.fail_open = true;

        let result = sampler.sample_all(&mut decoder, &source(), &|_: f64| {}).await;
        assert!(matches!(
            result,
            Err(ReelError::Sampler(SamplerError::MetadataUnavailable { .. }))
        ));
        assert!(decoder.captured.is_empty());
        assert_eq!(decoder.closes, 1);
    }

    #[tokio::test]
    async fn test_progress_reaches_100() {
        let sampler = FrameSampler::new(2000, 0.5).unwrap();
        let mut decoder = FakeDecoder::new(6000);
        let seen = Mutex::new(Vec::new());
        let reporter = |p: f64| seen.lock().unwrap().push(p);

        sampler.sample_all(&mut decoder, &source(), &reporter).await.unwrap();

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen, vec![25.0, 50.0, 75.0, 100.0]);
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(FrameSampler::new(0, 0.5).is_err());
    }
}
