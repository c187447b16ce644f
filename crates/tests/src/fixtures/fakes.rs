//! Deterministic stand-ins for the ONNX encoder and the two remote
//! providers.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use voxid_ml::{MlError, SpeakerEncoder};
use voxid_services::Utterance;
use voxid_services::providers::{
    DiarizedTranscript, Diarizer, MeetingSummary, ProviderError, Summarizer,
};

/// Maps a tone's dominant frequency to a Gaussian bump in embedding space:
/// same frequency -> identical embedding, 50 Hz apart -> cosine ~0.94,
/// 100 Hz apart -> ~0.78, far apart -> ~0.
pub struct ToneEncoder;

impl SpeakerEncoder for ToneEncoder {
    fn embed(&self, samples: &[f32]) -> Result<Vec<f32>, MlError> {
        // Zero-crossing rate over non-silent samples only, so leading or
        // trailing silence does not skew the frequency estimate.
        let mut crossings = 0usize;
        let mut active = 0usize;
        let mut prev: Option<f32> = None;
        for &x in samples {
            if x.abs() < 0.01 {
                continue;
            }
            active += 1;
            if let Some(p) = prev
                && p * x < 0.0
            {
                crossings += 1;
            }
            prev = Some(x);
        }
        if active < 8_000 {
            return Err(MlError::InvalidAudio("not enough speech".into()));
        }

        let freq_hz = crossings as f32 / active as f32 * 8_000.0;
        let bucket = (freq_hz / 50.0).round().clamp(0.0, 191.0);

        let mut v: Vec<f32> = (0..192)
            .map(|i| (-((i as f32 - bucket).powi(2)) / 8.0).exp())
            .collect();
        voxid_ml::normalize(&mut v);
        Ok(v)
    }
}

/// Diarizer returning a scripted transcript after an optional delay.
pub struct ScriptedDiarizer {
    transcript: Mutex<DiarizedTranscript>,
    delay: Mutex<Duration>,
}

impl ScriptedDiarizer {
    pub fn new() -> Self {
        Self {
            transcript: Mutex::new(DiarizedTranscript {
                utterances: Vec::new(),
                audio_duration_ms: 0,
                language: "en".to_string(),
            }),
            delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn script(&self, utterances: Vec<(&str, u64, u64)>, audio_duration_ms: u64) {
        *self.transcript.lock() = DiarizedTranscript {
            utterances: utterances
                .into_iter()
                .map(|(speaker, start_ms, end_ms)| Utterance {
                    speaker: speaker.to_string(),
                    text: format!("utterance {start_ms}-{end_ms}"),
                    start_ms,
                    end_ms,
                })
                .collect(),
            audio_duration_ms,
            language: "en".to_string(),
        };
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }
}

#[async_trait]
impl Diarizer for ScriptedDiarizer {
    async fn transcribe(&self, _audio_path: &Path) -> Result<DiarizedTranscript, ProviderError> {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.transcript.lock().clone())
    }
}

/// Summarizer returning a canned summary, optionally failing.
pub struct ScriptedSummarizer {
    fail: Mutex<bool>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSummarizer {
    pub fn new() -> Self {
        Self {
            fail: Mutex::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_next(&self) {
        *self.fail.lock() = true;
    }

    pub fn transcripts_seen(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Summarizer for ScriptedSummarizer {
    async fn summarize(&self, transcript: &str) -> Result<MeetingSummary, ProviderError> {
        self.calls.lock().push(transcript.to_string());
        if std::mem::take(&mut *self.fail.lock()) {
            return Err(ProviderError::Request {
                provider: "fake-summarizer",
                detail: "scripted failure".to_string(),
            });
        }
        Ok(MeetingSummary {
            executive_summary: "Weekly sync about the launch.".to_string(),
            action_items: Vec::new(),
            key_decisions: vec!["Ship on Friday".to_string()],
            topics_discussed: vec!["launch".to_string()],
        })
    }
}
