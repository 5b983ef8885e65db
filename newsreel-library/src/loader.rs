//! Audio decoding

use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

/// Errors that can occur during decoding
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("No audio track found")]
    NoAudioTrack,
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Decoded audio, always stereo interleaved
#[derive(Debug, Clone)]
pub struct LoadedAudio {
    /// Interleaved stereo samples (f32, normalized to -1.0 to 1.0)
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Channel count of the source before stereo conversion
    pub source_channels: u16,
    pub duration_secs: f64,
}

impl LoadedAudio {
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }
}

/// Audio decoder using Symphonia
pub struct TrackLoader {
    target_sample_rate: u32,
}

impl Default for TrackLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackLoader {
    /// Create a loader producing 48kHz audio
    pub fn new() -> Self {
        Self::with_sample_rate(48000)
    }

    pub fn with_sample_rate(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    /// Decode an in-memory file; `extension` helps format probing
    pub fn decode(&self, bytes: Vec<u8>, extension: Option<&str>) -> Result<LoadedAudio, LoadError> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| LoadError::Decode(e.to_string()))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(LoadError::NoAudioTrack)?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();
        let source_sample_rate = codec_params.sample_rate.unwrap_or(44100);
        let channels = codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(2)
            .max(1);

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| LoadError::Decode(e.to_string()))?;

        let mut samples: Vec<f32> = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(symphonia::core::errors::Error::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Stopped reading packets");
                    break;
                }
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping undecodable packet");
                    continue;
                }
            };

            let spec = *decoded.spec();
            let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(sample_buf.samples());
        }

        let stereo = to_stereo(&samples, channels as usize);
        let duration_secs = (stereo.len() / 2) as f64 / source_sample_rate as f64;

        let (samples, sample_rate) = if source_sample_rate != self.target_sample_rate {
            (
                self.resample(&stereo, source_sample_rate)?,
                self.target_sample_rate,
            )
        } else {
            (stereo, source_sample_rate)
        };

        tracing::debug!(
            source_rate = source_sample_rate,
            channels,
            duration_secs,
            "Decoded audio"
        );

        Ok(LoadedAudio {
            samples,
            sample_rate,
            source_channels: channels,
            duration_secs,
        })
    }

    /// Resample interleaved stereo to the target rate
    fn resample(&self, samples: &[f32], source_rate: u32) -> Result<Vec<f32>, LoadError> {
        use rubato::{FftFixedInOut, Resampler};

        const CHANNELS: usize = 2;
        let frames = samples.len() / CHANNELS;

        let mut resampler = FftFixedInOut::<f32>::new(
            source_rate as usize,
            self.target_sample_rate as usize,
            1024,
            CHANNELS,
        )
        .map_err(|e| LoadError::Decode(e.to_string()))?;

        let deinterleaved: Vec<Vec<f32>> = (0..CHANNELS)
            .map(|ch| (0..frames).map(|f| samples[f * CHANNELS + ch]).collect())
            .collect();

        let chunk_size = resampler.input_frames_next();
        let mut output: Vec<Vec<f32>> = vec![Vec::new(); CHANNELS];

        let mut pos = 0;
        while pos + chunk_size <= frames {
            let input: Vec<&[f32]> = deinterleaved
                .iter()
                .map(|ch| &ch[pos..pos + chunk_size])
                .collect();
            let resampled = resampler
                .process(&input, None)
                .map_err(|e| LoadError::Decode(e.to_string()))?;
            for (ch, data) in resampled.into_iter().enumerate() {
                output[ch].extend(data);
            }
            pos += chunk_size;
        }

        // Tail: pad with zeros, keep the proportional share of the output
        if pos < frames {
            let remaining = frames - pos;
            let padded: Vec<Vec<f32>> = deinterleaved
                .iter()
                .map(|ch| {
                    let mut v = ch[pos..].to_vec();
                    v.resize(chunk_size, 0.0);
                    v
                })
                .collect();
            let resampled = resampler
                .process(&padded, None)
                .map_err(|e| LoadError::Decode(e.to_string()))?;
            let keep = remaining * self.target_sample_rate as usize / source_rate as usize;
            for (ch, data) in resampled.into_iter().enumerate() {
                output[ch].extend(&data[..keep.min(data.len())]);
            }
        }

        let out_frames = output[0].len().min(output[1].len());
        let mut interleaved = Vec::with_capacity(out_frames * CHANNELS);
        for frame in 0..out_frames {
            interleaved.push(output[0][frame]);
            interleaved.push(output[1][frame]);
        }
        Ok(interleaved)
    }
}

/// Mono is duplicated, extra channels beyond the first two are dropped
fn to_stereo(samples: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        2 => samples.to_vec(),
        1 => samples.iter().flat_map(|&s| [s, s]).collect(),
        n => samples
            .chunks_exact(n)
            .flat_map(|frame| [frame[0], frame[1]])
            .collect(),
    }
}
