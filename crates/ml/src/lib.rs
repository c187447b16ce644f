//! Voice-activity detection and speaker embedding extraction.
//!
//! Both models sit behind small traits so the pipeline can run against
//! deterministic stand-ins in tests while production wires ONNX sessions.

pub mod encoder;
pub mod vad;

use thiserror::Error;

pub use encoder::{EcapaEncoder, SpeakerEncoder};
pub use vad::{EnergyScorer, FrameScorer, SpeechGate, Vad, VadConfig};

/// Dimension of the speaker embedding space.
pub const EMBEDDING_DIM: usize = 192;

/// Minimum retained speech required for a usable embedding.
pub const MIN_EMBED_SPEECH_MS: u64 = 500;

#[derive(Debug, Error)]
pub enum MlError {
    #[error("Invalid audio: {0}")]
    InvalidAudio(String),
    #[error("Model error: {0}")]
    Model(String),
}

impl<R> From<ort::Error<R>> for MlError {
    fn from(err: ort::Error<R>) -> Self {
        MlError::Model(err.to_string())
    }
}

/// L2-normalizes a vector in place. Zero vectors are left untouched.
pub fn normalize(v: &mut [f32]) {
    let sum_sq: f64 = v.iter().map(|&x| (x as f64) * (x as f64)).sum();
    if sum_sq < 1e-10 {
        return;
    }
    let inv = (1.0 / sum_sq.sqrt()) as f32;
    for x in v.iter_mut() {
        *x *= inv;
    }
}

/// Cosine similarity between two vectors, in `[-1, 1]`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot: f64 = 0.0;
    let mut norm_a: f64 = 0.0;
    let mut norm_b: f64 = 0.0;
    for i in 0..a.len() {
        let x = a[i] as f64;
        let y = b[i] as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}
