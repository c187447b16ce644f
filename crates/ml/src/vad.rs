//! Voice-activity detection: an energy pre-gate plus a Silero ONNX scorer,
//! followed by a pure frame-state machine that turns chunk probabilities
//! into speech sample ranges.

use std::ops::Range;
use std::path::Path;
use std::sync::Mutex;

use ort::session::{Session, builder::GraphOptimizationLevel};
use tracing::{debug, info};

use crate::MlError;

/// Samples per scored chunk at 16 kHz (the Silero frame size).
pub const CHUNK_SIZE: usize = 512;

const SAMPLE_RATE: usize = 16_000;

/// Tunables for the VAD state machine.
#[derive(Debug, Clone)]
pub struct VadConfig {
    /// Speech probability threshold (0.0 - 1.0).
    pub threshold: f32,
    /// Silence this long ends a speech segment.
    pub min_silence_ms: u64,
    /// Padding added around detected speech, clamped to the input.
    pub speech_pad_ms: u64,
    /// Segments shorter than this are dropped.
    pub min_speech_ms: u64,
    /// RMS floor below which a chunk is scored 0 without running the model.
    pub energy_floor: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            min_silence_ms: 100,
            speech_pad_ms: 30,
            min_speech_ms: 250,
            energy_floor: 1e-4,
        }
    }
}

/// Scores one fixed-size chunk with a speech probability.
///
/// Stateful scorers (the Silero LSTM) are reset before each full pass.
pub trait FrameScorer: Send {
    fn reset(&mut self);
    fn score(&mut self, chunk: &[f32]) -> Result<f32, MlError>;
}

/// Gate over non-speech audio. The two provided operations derive from
/// `speech_segments`, so removed regions contribute zero duration and
/// duration is additive over concatenated segments for every implementation.
pub trait SpeechGate: Send + Sync {
    /// Speech regions as sample ranges, ordered and non-overlapping.
    fn speech_segments(&self, samples: &[f32]) -> Result<Vec<Range<usize>>, MlError>;

    /// Returns the input with non-speech regions removed. Never expands.
    fn strip_silence(&self, samples: &[f32]) -> Result<Vec<f32>, MlError> {
        let segments = self.speech_segments(samples)?;
        let total: usize = segments.iter().map(|r| r.len()).sum();
        let mut out = Vec::with_capacity(total);
        for range in segments {
            out.extend_from_slice(&samples[range]);
        }
        Ok(out)
    }

    /// Milliseconds of detected speech.
    fn speech_duration_ms(&self, samples: &[f32]) -> Result<u64, MlError> {
        let segments = self.speech_segments(samples)?;
        let total: usize = segments.iter().map(|r| r.len()).sum();
        Ok((total * 1000 / SAMPLE_RATE) as u64)
    }
}

/// VAD gate combining an energy pre-filter with a pluggable chunk scorer.
pub struct Vad {
    scorer: Mutex<Box<dyn FrameScorer>>,
    config: VadConfig,
}

impl Vad {
    /// Production gate backed by a Silero ONNX model.
    pub fn silero(model_path: impl AsRef<Path>, config: VadConfig) -> Result<Self, MlError> {
        let scorer = SileroScorer::new(model_path.as_ref())?;
        Ok(Self::with_scorer(Box::new(scorer), config))
    }

    /// Gate with a caller-supplied scorer (tests, model-free deployments).
    pub fn with_scorer(scorer: Box<dyn FrameScorer>, config: VadConfig) -> Self {
        Self {
            scorer: Mutex::new(scorer),
            config,
        }
    }

    fn chunk_probs(&self, samples: &[f32]) -> Result<Vec<f32>, MlError> {
        let mut scorer = self.scorer.lock().expect("vad scorer poisoned");
        scorer.reset();

        let mut probs = Vec::with_capacity(samples.len().div_ceil(CHUNK_SIZE));
        for chunk in samples.chunks(CHUNK_SIZE) {
            if rms(chunk) < self.config.energy_floor {
                probs.push(0.0);
                continue;
            }
            let prob = if chunk.len() < CHUNK_SIZE {
                let mut padded = vec![0.0; CHUNK_SIZE];
                padded[..chunk.len()].copy_from_slice(chunk);
                scorer.score(&padded)?
            } else {
                scorer.score(chunk)?
            };
            probs.push(prob);
        }
        Ok(probs)
    }
}

impl SpeechGate for Vad {
    fn speech_segments(&self, samples: &[f32]) -> Result<Vec<Range<usize>>, MlError> {
        if samples.is_empty() {
            return Ok(Vec::new());
        }
        let probs = self.chunk_probs(samples)?;
        let segments = segments_from_probs(&probs, &self.config, samples.len());
        debug!(
            input_ms = samples.len() * 1000 / SAMPLE_RATE,
            segments = segments.len(),
            "vad pass complete"
        );
        Ok(segments)
    }
}

fn rms(chunk: &[f32]) -> f32 {
    if chunk.is_empty() {
        return 0.0;
    }
    (chunk.iter().map(|&x| x * x).sum::<f32>() / chunk.len() as f32).sqrt()
}

/// Turns per-chunk speech probabilities into padded, merged sample ranges.
pub fn segments_from_probs(
    probs: &[f32],
    config: &VadConfig,
    total_samples: usize,
) -> Vec<Range<usize>> {
    let ms_per_chunk = CHUNK_SIZE * 1000 / SAMPLE_RATE;
    let min_silence_chunks = (config.min_silence_ms as usize).div_ceil(ms_per_chunk).max(1);
    let min_speech_samples = config.min_speech_ms as usize * SAMPLE_RATE / 1000;
    let pad_samples = config.speech_pad_ms as usize * SAMPLE_RATE / 1000;

    let mut raw: Vec<Range<usize>> = Vec::new();
    let mut in_speech = false;
    let mut speech_start = 0usize;
    let mut silence_count = 0usize;

    for (i, &prob) in probs.iter().enumerate() {
        if prob >= config.threshold {
            if !in_speech {
                speech_start = i;
                in_speech = true;
            }
            silence_count = 0;
        } else if in_speech {
            silence_count += 1;
            if silence_count >= min_silence_chunks {
                let end_chunk = i + 1 - silence_count;
                raw.push(speech_start * CHUNK_SIZE..end_chunk * CHUNK_SIZE);
                in_speech = false;
                silence_count = 0;
            }
        }
    }
    if in_speech {
        let end_chunk = probs.len() - silence_count;
        raw.push(speech_start * CHUNK_SIZE..end_chunk * CHUNK_SIZE);
    }

    // Pad, clamp, drop too-short, merge overlaps.
    let mut segments: Vec<Range<usize>> = Vec::with_capacity(raw.len());
    for range in raw {
        if range.len() < min_speech_samples {
            continue;
        }
        let start = range.start.saturating_sub(pad_samples);
        let end = (range.end + pad_samples).min(total_samples);
        match segments.last_mut() {
            Some(prev) if start <= prev.end => prev.end = end.max(prev.end),
            _ => segments.push(start..end),
        }
    }
    segments
}

/// Silero VAD chunk scorer over an ONNX session.
///
/// Keeps the model's LSTM state and a 64-sample context window between
/// chunks, reset at the start of each full pass.
pub struct SileroScorer {
    session: Session,
    state: Vec<f32>,
    context: Vec<f32>,
}

const CONTEXT_SIZE: usize = 64;
const STATE_SIZE: usize = 2 * 1 * 128;

impl SileroScorer {
    pub fn new(model_path: &Path) -> Result<Self, MlError> {
        info!(path = %model_path.display(), "loading Silero VAD model");
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        Ok(Self {
            session,
            state: vec![0.0; STATE_SIZE],
            context: vec![0.0; CONTEXT_SIZE],
        })
    }
}

impl FrameScorer for SileroScorer {
    fn reset(&mut self) {
        self.state.fill(0.0);
        self.context.fill(0.0);
    }

    fn score(&mut self, chunk: &[f32]) -> Result<f32, MlError> {
        let mut input_data = Vec::with_capacity(CONTEXT_SIZE + chunk.len());
        input_data.extend_from_slice(&self.context);
        input_data.extend_from_slice(chunk);

        if chunk.len() >= CONTEXT_SIZE {
            self.context.copy_from_slice(&chunk[chunk.len() - CONTEXT_SIZE..]);
        } else {
            self.context.rotate_left(chunk.len());
            let keep = CONTEXT_SIZE - chunk.len();
            self.context[keep..].copy_from_slice(chunk);
        }

        let input_len = input_data.len();
        let input_tensor =
            ort::value::Tensor::from_array(([1_i64, input_len as i64], input_data))?;
        let state_tensor =
            ort::value::Tensor::from_array(([2_i64, 1_i64, 128_i64], self.state.clone()))?;
        let sr_tensor = ort::value::Tensor::from_array(([1_i64], vec![SAMPLE_RATE as i64]))?;

        let outputs = self.session.run(ort::inputs![
            "input" => input_tensor,
            "state" => state_tensor,
            "sr" => sr_tensor,
        ])?;

        let (_, output_data) = outputs
            .get("output")
            .ok_or_else(|| MlError::Model("VAD model returned no output tensor".into()))?
            .try_extract_tensor::<f32>()?;
        let prob = output_data[0];

        let (_, new_state) = outputs
            .get("stateN")
            .ok_or_else(|| MlError::Model("VAD model returned no stateN tensor".into()))?
            .try_extract_tensor::<f32>()?;
        self.state.copy_from_slice(new_state);

        Ok(prob)
    }
}

/// Model-free scorer: speech iff chunk RMS exceeds a threshold.
///
/// Good enough for tests and development machines without the ONNX model;
/// production uses [`SileroScorer`] behind the same gate.
pub struct EnergyScorer {
    pub rms_threshold: f32,
}

impl Default for EnergyScorer {
    fn default() -> Self {
        Self { rms_threshold: 0.01 }
    }
}

impl FrameScorer for EnergyScorer {
    fn reset(&mut self) {}

    fn score(&mut self, chunk: &[f32]) -> Result<f32, MlError> {
        Ok(if rms(chunk) >= self.rms_threshold { 1.0 } else { 0.0 })
    }
}
