//! Container decoding: WAV via hound, everything else via symphonia.
//!
//! All decoders feed a [`MonoFold`], which averages interleaved channels
//! into mono frames as samples stream out of the decoder, so no
//! per-channel intermediate buffer is ever built.

use std::path::Path;

use tracing::debug;

use crate::{AudioError, SAMPLE_RATE, resample::resample_to_16k};

/// Decodes any supported audio file into 16 kHz mono f32 samples.
pub fn decode_any(path: &Path) -> Result<Vec<f32>, AudioError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "wav" => decode_wav(path),
        "mp3" | "m4a" | "mp4" | "aac" | "ogg" | "opus" | "flac" | "webm" => {
            decode_with_symphonia(path)
        }
        other => Err(AudioError::UnsupportedFormat(other.to_string())),
    }
}

/// Folds an interleaved sample stream into mono frames incrementally.
///
/// Carries a partial frame across calls, so decoders can push one packet
/// at a time without worrying about frame alignment.
struct MonoFold {
    channels: usize,
    frame_sum: f32,
    filled: usize,
    samples: Vec<f32>,
}

impl MonoFold {
    fn new(channels: usize, frames_hint: usize) -> Self {
        Self {
            channels: channels.max(1),
            frame_sum: 0.0,
            filled: 0,
            samples: Vec::with_capacity(frames_hint),
        }
    }

    fn extend(&mut self, interleaved: impl Iterator<Item = f32>) {
        for sample in interleaved {
            self.frame_sum += sample;
            self.filled += 1;
            if self.filled == self.channels {
                self.samples.push(self.frame_sum / self.channels as f32);
                self.frame_sum = 0.0;
                self.filled = 0;
            }
        }
    }

    fn finish(self) -> Vec<f32> {
        self.samples
    }
}

/// Drains an open WAV reader into mono f32 samples.
///
/// hound hands integer samples over as `i32` regardless of bit depth, so
/// they are scaled by the depth's full-scale value; floats pass through.
pub(crate) fn read_mono<R: std::io::Read>(reader: hound::WavReader<R>) -> Vec<f32> {
    let spec = reader.spec();
    let frames = reader.duration() as usize;
    let mut fold = MonoFold::new(spec.channels as usize, frames);

    match spec.sample_format {
        hound::SampleFormat::Float => {
            fold.extend(reader.into_samples::<f32>().map(|s| s.unwrap_or_default()));
        }
        hound::SampleFormat::Int => {
            let full_scale = f32::powi(2.0, spec.bits_per_sample as i32 - 1);
            fold.extend(
                reader
                    .into_samples::<i32>()
                    .map(move |s| s.unwrap_or_default() as f32 / full_scale),
            );
        }
    }

    fold.finish()
}

fn decode_wav(path: &Path) -> Result<Vec<f32>, AudioError> {
    let reader = hound::WavReader::open(path).map_err(|e| AudioError::Decode {
        path: path.display().to_string(),
        detail: e.to_string(),
    })?;
    let sample_rate = reader.spec().sample_rate;
    let mono = read_mono(reader);

    if sample_rate != SAMPLE_RATE {
        resample_to_16k(&mono, sample_rate)
    } else {
        Ok(mono)
    }
}

fn decode_with_symphonia(path: &Path) -> Result<Vec<f32>, AudioError> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let path_display = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|e| AudioError::Open {
        path: path_display.clone(),
        source: e,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AudioError::Decode {
            path: path_display.clone(),
            detail: e.to_string(),
        })?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| AudioError::NoAudioTrack(path_display.clone()))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| AudioError::NoAudioTrack(path_display.clone()))?;
    let channels = track
        .codec_params
        .channels
        .ok_or_else(|| AudioError::NoAudioTrack(path_display.clone()))?
        .count();
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::Decode {
            path: path_display.clone(),
            detail: e.to_string(),
        })?;

    let mut fold = MonoFold::new(channels, 0);
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(_) => break,
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            // Decode errors on a single packet are recoverable; skip it.
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => {
                return Err(AudioError::Decode {
                    path: path_display,
                    detail: e.to_string(),
                });
            }
        };

        let spec = *decoded.spec();
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        fold.extend(sample_buf.samples().iter().copied());
    }

    let mono = fold.finish();
    if mono.is_empty() {
        return Err(AudioError::NoAudioTrack(path_display));
    }

    debug!(
        path = %path_display,
        sample_rate,
        channels,
        frames = mono.len(),
        "decoded compressed audio"
    );

    if sample_rate != SAMPLE_RATE {
        resample_to_16k(&mono, sample_rate)
    } else {
        Ok(mono)
    }
}
