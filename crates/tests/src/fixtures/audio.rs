//! Synthetic test audio: sine tones stand in for voices. The fake encoder
//! maps a tone's frequency to an embedding bucket, so two recordings at
//! the same frequency are "the same voice" and frequencies 100 Hz apart
//! are distinct-but-similar voices.

use std::io::Cursor;

pub const SAMPLE_RATE: u32 = 16_000;

pub fn tone(freq_hz: f32, ms: u64) -> Vec<f32> {
    let samples = (ms as usize) * 16;
    (0..samples)
        .map(|i| {
            (2.0 * std::f32::consts::PI * freq_hz * i as f32 / SAMPLE_RATE as f32).sin() * 0.5
        })
        .collect()
}

pub fn silence(ms: u64) -> Vec<f32> {
    vec![0.0; (ms as usize) * 16]
}

/// Encodes samples as a 16-bit mono WAV in memory.
pub fn wav_bytes(samples: &[f32]) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &sample in samples {
            let s16 = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
            writer.write_sample(s16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Builds meeting audio: a silent canvas with tones where speakers talk.
pub struct MeetingAudio {
    samples: Vec<f32>,
}

impl MeetingAudio {
    pub fn new(total_ms: u64) -> Self {
        Self {
            samples: silence(total_ms),
        }
    }

    pub fn with_tone(mut self, start_ms: u64, end_ms: u64, freq_hz: f32) -> Self {
        let start = (start_ms as usize) * 16;
        let end = ((end_ms as usize) * 16).min(self.samples.len());
        for i in start..end {
            self.samples[i] =
                (2.0 * std::f32::consts::PI * freq_hz * i as f32 / SAMPLE_RATE as f32).sin() * 0.5;
        }
        self
    }

    pub fn into_wav_bytes(self) -> Vec<u8> {
        wav_bytes(&self.samples)
    }
}
