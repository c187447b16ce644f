//! Speaker embedding extraction (ECAPA-TDNN, 192-dim).

use std::path::Path;
use std::sync::{Arc, Mutex};

use ort::session::{Session, builder::GraphOptimizationLevel};
use tracing::info;

use crate::vad::SpeechGate;
use crate::{EMBEDDING_DIM, MIN_EMBED_SPEECH_MS, MlError, normalize};

/// Extracts a fixed-dimensional unit-norm voice embedding from 16 kHz mono
/// audio. Pure function of the input; safe to call from multiple threads.
pub trait SpeakerEncoder: Send + Sync {
    fn embed(&self, samples_16k_mono: &[f32]) -> Result<Vec<f32>, MlError>;
}

/// ECAPA-TDNN speaker encoder over an ONNX session.
///
/// Input audio is VAD-stripped first so the embedding summarizes speech
/// rather than room tone. The model takes a `[1, samples]` waveform tensor
/// and returns a `[1, 192]` embedding.
pub struct EcapaEncoder {
    session: Mutex<Session>,
    gate: Arc<dyn SpeechGate>,
}

impl EcapaEncoder {
    pub fn new(model_path: impl AsRef<Path>, gate: Arc<dyn SpeechGate>) -> Result<Self, MlError> {
        let model_path = model_path.as_ref();
        info!(path = %model_path.display(), "loading speaker encoder model");
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        Ok(Self {
            session: Mutex::new(session),
            gate,
        })
    }
}

impl SpeakerEncoder for EcapaEncoder {
    fn embed(&self, samples_16k_mono: &[f32]) -> Result<Vec<f32>, MlError> {
        if samples_16k_mono.is_empty() {
            return Err(MlError::InvalidAudio("empty waveform".into()));
        }

        let speech = self.gate.strip_silence(samples_16k_mono)?;
        let min_samples = (MIN_EMBED_SPEECH_MS as usize) * 16;
        if speech.len() < min_samples {
            return Err(MlError::InvalidAudio(format!(
                "only {}ms of speech after VAD, need at least {}ms",
                speech.len() / 16,
                MIN_EMBED_SPEECH_MS
            )));
        }

        let len = speech.len();
        let waveform = ort::value::Tensor::from_array(([1_i64, len as i64], speech))?;

        let mut embedding = {
            let mut session = self.session.lock().expect("encoder session poisoned");
            let outputs = session.run(ort::inputs!["waveform" => waveform])?;
            let (_, data) = outputs
                .get("embedding")
                .ok_or_else(|| MlError::Model("encoder returned no embedding tensor".into()))?
                .try_extract_tensor::<f32>()?;
            data.to_vec()
        };

        if embedding.len() != EMBEDDING_DIM {
            return Err(MlError::Model(format!(
                "expected {EMBEDDING_DIM}-dim embedding, model produced {}",
                embedding.len()
            )));
        }

        normalize(&mut embedding);
        Ok(embedding)
    }
}
