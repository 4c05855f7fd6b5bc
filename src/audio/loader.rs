use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::audio::types::AudioBuffer;
use crate::error::{AudioError, Result};

/// Decodes fetched audio bytes into an [`AudioBuffer`]
pub struct AudioLoader;

impl AudioLoader {
    /// Decode `bytes` fetched from `locator`.
    ///
    /// WAV goes through hound, everything else (MP3, FLAC, OGG, AAC, the
    /// audio track of an MP4) through symphonia.
    pub fn decode(bytes: Vec<u8>, locator: &str) -> Result<AudioBuffer> {
        if bytes.is_empty() {
            return Err(Self::failure(locator, "no data"));
        }

        let buffer = if Self::is_wav(&bytes) {
            Self::decode_wav(bytes, locator)?
        } else {
            Self::decode_with_symphonia(bytes, locator)?
        };

        if buffer.is_empty() {
            return Err(Self::failure(locator, "no audio samples decoded"));
        }

        debug!(
            "Decoded {}: {:.1}s, {} Hz, {} channels",
            locator,
            buffer.duration(),
            buffer.sample_rate(),
            buffer.channels()
        );
        Ok(buffer)
    }

    fn failure<S: Into<String>>(locator: &str, reason: S) -> crate::error::ReelError {
        AudioError::DecodeFailure {
            locator: locator.to_string(),
            reason: reason.into(),
        }
        .into()
    }

    fn is_wav(bytes: &[u8]) -> bool {
        bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
    }

    fn decode_wav(bytes: Vec<u8>, locator: &str) -> Result<AudioBuffer> {
        let reader = hound::WavReader::new(Cursor::new(bytes))
            .map_err(|e| Self::failure(locator, e.to_string()))?;

        let spec = reader.spec();
        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Self::failure(locator, e.to_string()))?,
            hound::SampleFormat::Int => {
                let bit_depth = spec.bits_per_sample;
                reader
                    .into_samples::<i32>()
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| Self::failure(locator, e.to_string()))?
                    .into_iter()
                    .map(|sample| Self::int_to_float(sample, bit_depth))
                    .collect()
            }
        };

        Ok(AudioBuffer::new(samples, spec.sample_rate, spec.channels))
    }

    fn decode_with_symphonia(bytes: Vec<u8>, locator: &str) -> Result<AudioBuffer> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = Self::extension_hint(locator) {
            hint.with_extension(&extension);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Self::failure(locator, format!("unrecognised format: {}", e)))?;

        let mut format = probed.format;

        // First audio track with a decodable codec
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
            .ok_or_else(|| Self::failure(locator, "no audio track"))?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
        let mut channels = track.codec_params.channels.map(|c| c.count() as u16);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Self::failure(locator, format!("unsupported codec: {}", e)))?;

        let mut samples = Vec::new();
        let mut sample_buf: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                // End of stream
                Err(SymphoniaError::IoError(_)) => break,
                Err(e) => return Err(Self::failure(locator, e.to_string())),
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    channels.get_or_insert(spec.channels.count() as u16);

                    let buf = sample_buf.get_or_insert_with(|| {
                        SampleBuffer::<f32>::new(decoded.capacity() as u64, spec)
                    });
                    if buf.capacity() < decoded.capacity() * spec.channels.count() {
                        *buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    }
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping undecodable packet in {}: {}", locator, e);
                    continue;
                }
                Err(SymphoniaError::IoError(_)) => break,
                Err(e) => return Err(Self::failure(locator, e.to_string())),
            }
        }

        Ok(AudioBuffer::new(samples, sample_rate, channels.unwrap_or(2)))
    }

    /// File extension of a path or URL, ignoring any query string
    fn extension_hint(locator: &str) -> Option<String> {
        let path = locator.split(['?', '#']).next()?;
        let file = path.rsplit('/').next()?;
        let (_, ext) = file.rsplit_once('.')?;
        if ext.is_empty() {
            None
        } else {
            Some(ext.to_lowercase())
        }
    }

    /// Convert integer sample to float (-1.0 to 1.0); hound already
    /// re-centres unsigned 8-bit data around zero
    fn int_to_float(sample: i32, bit_depth: u16) -> f32 {
        match bit_depth {
            8 => sample as f32 / 128.0,
            16 => sample as f32 / 32768.0,
            24 => sample as f32 / 8388608.0,
            32 => sample as f32 / 2147483648.0,
            _ => sample as f32 / 32768.0,
        }
    }
}
