//! Audio toolkit: container decoding, 16 kHz mono WAV conversion, and
//! millisecond-addressed slicing/stitching of meeting audio.
//!
//! Everything downstream (VAD, embedding, clip playback) consumes 16 kHz
//! mono f32 samples; this crate is the only place that touches codecs.

mod decode;
mod resample;

use std::path::Path;

use thiserror::Error;

pub use decode::decode_any;

/// Target sample rate for the whole pipeline.
pub const SAMPLE_RATE: u32 = 16_000;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Failed to open audio file '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to decode '{path}': {detail}")]
    Decode { path: String, detail: String },
    #[error("No audio track in '{0}'")]
    NoAudioTrack(String),
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),
    #[error("Expected 16kHz WAV but got {rate}Hz in '{path}'")]
    BadSampleRate { path: String, rate: u32 },
    #[error("Resample error: {0}")]
    Resample(String),
    #[error("Failed to write WAV '{path}': {detail}")]
    Write { path: String, detail: String },
}

pub fn ms_to_samples(ms: u64) -> usize {
    (ms as usize) * (SAMPLE_RATE as usize) / 1000
}

pub fn samples_to_ms(samples: usize) -> u64 {
    (samples as u64) * 1000 / SAMPLE_RATE as u64
}

/// A 16 kHz mono waveform held in memory.
///
/// The segment selector slices the same meeting WAV once per candidate
/// utterance; loading the file once and slicing in memory avoids re-reading
/// it from disk for every span.
#[derive(Debug, Clone)]
pub struct WavBuffer {
    samples: Vec<f32>,
}

impl WavBuffer {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AudioError> {
        Ok(Self {
            samples: read_wav_16k_mono(path)?,
        })
    }

    pub fn from_samples(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn duration_ms(&self) -> u64 {
        samples_to_ms(self.samples.len())
    }

    /// Exclusive-end slice `[start_ms, end_ms)`, clamped to the buffer.
    pub fn slice_ms(&self, start_ms: u64, end_ms: u64) -> &[f32] {
        let start = ms_to_samples(start_ms).min(self.samples.len());
        let end = ms_to_samples(end_ms).clamp(start, self.samples.len());
        &self.samples[start..end]
    }

    /// Concatenates the given spans in order with no gap.
    pub fn stitch_ms(&self, spans: &[(u64, u64)]) -> Vec<f32> {
        let total: usize = spans
            .iter()
            .map(|&(s, e)| self.slice_ms(s, e).len())
            .sum();
        let mut out = Vec::with_capacity(total);
        for &(start, end) in spans {
            out.extend_from_slice(self.slice_ms(start, end));
        }
        out
    }
}

/// Converts any supported container to 16 kHz mono 16-bit PCM WAV.
///
/// Returns the duration of the converted audio in milliseconds.
pub fn convert_to_wav_16k_mono(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> Result<u64, AudioError> {
    let samples = decode_any(input.as_ref())?;
    write_wav_16k_mono(output.as_ref(), &samples)?;
    Ok(samples_to_ms(samples.len()))
}

/// Raw duration of an audio file in milliseconds, before any conversion.
pub fn duration_ms(path: impl AsRef<Path>) -> Result<u64, AudioError> {
    let samples = decode_any(path.as_ref())?;
    Ok(samples_to_ms(samples.len()))
}

/// Reads a WAV file that must already be 16 kHz; downmixes to mono.
pub fn read_wav_16k_mono(path: impl AsRef<Path>) -> Result<Vec<f32>, AudioError> {
    let path = path.as_ref();
    let reader = hound::WavReader::open(path).map_err(|e| AudioError::Decode {
        path: path.display().to_string(),
        detail: e.to_string(),
    })?;
    let rate = reader.spec().sample_rate;
    if rate != SAMPLE_RATE {
        return Err(AudioError::BadSampleRate {
            path: path.display().to_string(),
            rate,
        });
    }
    Ok(decode::read_mono(reader))
}

/// Writes 16 kHz mono f32 samples as a 16-bit PCM WAV file.
pub fn write_wav_16k_mono(path: impl AsRef<Path>, samples: &[f32]) -> Result<(), AudioError> {
    let path = path.as_ref();
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let write_err = |e: hound::Error| AudioError::Write {
        path: path.display().to_string(),
        detail: e.to_string(),
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(write_err)?;
    for &sample in samples {
        let s16 = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        writer.write_sample(s16).map_err(write_err)?;
    }
    writer.finalize().map_err(write_err)
}

/// Extracts the exclusive-end slice `[start_ms, end_ms)` into a new WAV.
pub fn extract(
    path: impl AsRef<Path>,
    start_ms: u64,
    end_ms: u64,
    out: impl AsRef<Path>,
) -> Result<(), AudioError> {
    let buffer = WavBuffer::load(path)?;
    write_wav_16k_mono(out, buffer.slice_ms(start_ms, end_ms))
}

/// Stitches the given spans into a single gapless WAV, in the given order.
///
/// Returns the stitched duration in milliseconds.
pub fn stitch(
    path: impl AsRef<Path>,
    spans: &[(u64, u64)],
    out: impl AsRef<Path>,
) -> Result<u64, AudioError> {
    let buffer = WavBuffer::load(path)?;
    let stitched = buffer.stitch_ms(spans);
    write_wav_16k_mono(out, &stitched)?;
    Ok(samples_to_ms(stitched.len()))
}
