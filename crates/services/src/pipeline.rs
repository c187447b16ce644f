//! The identification job: persist upload, diarize, convert, select and
//! embed per-speaker audio, match competitively, store the session.
//!
//! Stages run strictly in order. Events stream through an mpsc channel to
//! the SSE response; a failed send means the client is gone, and the job
//! aborts at that yield point and removes its temp files. A session exists
//! only once the final stage completes.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use voxid_audio::{AudioError, WavBuffer};
use voxid_ml::{MlError, SpeakerEncoder, SpeechGate};

use crate::matcher::{MatcherConfig, SpeakerMatch, match_speakers};
use crate::providers::{Diarizer, ProviderError};
use crate::selector::{Selection, SelectorConfig, select_segments};
use crate::session::{
    MeetingSession, SESSION_TTL, SessionStore, SpeakerReport, new_meeting_id,
};
use crate::vector::{VectorError, VectorIndex};
use crate::{Utterance, telemetry};

/// Cadence of SSE comment heartbeats, tuned to survive reverse-proxy idle
/// timeouts.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Ml(#[from] MlError),
    #[error(transparent)]
    Vector(#[from] VectorError),
    #[error("Pipeline task failed: {0}")]
    Task(String),
}

impl PipelineError {
    /// Message safe to put on the wire; full detail goes to the log.
    fn public_message(&self) -> String {
        match self {
            PipelineError::Provider(ProviderError::Timeout { .. }) => {
                "Transcription provider timed out. Please try again.".to_string()
            }
            PipelineError::Provider(_) => {
                "Transcription failed. Please try again.".to_string()
            }
            _ => "Identification failed. Please try again.".to_string(),
        }
    }
}

/// Events emitted over the identification stream.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Progress {
        stage: &'static str,
        message: &'static str,
    },
    Done(Box<IdentifyOutcome>),
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct LabeledUtterance {
    pub speaker_id: String,
    pub speaker_name: String,
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// Terminal payload of a successful identification run.
#[derive(Debug, Clone, Serialize)]
pub struct IdentifyOutcome {
    pub success: bool,
    pub meeting_id: Option<String>,
    pub speakers: Vec<SpeakerReport>,
    pub utterances: Vec<LabeledUtterance>,
    pub audio_duration_ms: u64,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The identification pipeline with its collaborators, built once in the
/// composition root and shared across requests.
pub struct IdentifyPipeline {
    pub diarizer: Arc<dyn Diarizer>,
    pub gate: Arc<dyn SpeechGate>,
    pub encoder: Arc<dyn SpeakerEncoder>,
    pub index: Arc<dyn VectorIndex>,
    pub sessions: Arc<SessionStore>,
    pub selector: SelectorConfig,
    pub matcher: MatcherConfig,
}

enum StageEnd {
    Finished,
    Cancelled,
}

impl IdentifyPipeline {
    /// Runs the full job. Consumes the upload file; on every exit path the
    /// upload is deleted, and the converted WAV survives only inside a
    /// stored session.
    pub async fn run(
        &self,
        upload_path: PathBuf,
        device_id: String,
        tx: mpsc::Sender<PipelineEvent>,
    ) {
        let started = Instant::now();
        let meeting_id = new_meeting_id();
        let wav_path = self
            .sessions
            .audio_dir()
            .join(format!("{meeting_id}.wav"));

        let outcome = self
            .run_stages(&meeting_id, &upload_path, &wav_path, &device_id, &tx)
            .await;

        match outcome {
            Ok(StageEnd::Finished) => {
                info!(
                    meeting_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "identification finished"
                );
            }
            Ok(StageEnd::Cancelled) => {
                warn!(meeting_id, "client disconnected during identification");
            }
            Err(e) => {
                error!(meeting_id, error = %e, "identification failed");
                let _ = tx
                    .send(PipelineEvent::Error {
                        message: e.public_message(),
                    })
                    .await;
            }
        }

        remove_if_exists(&upload_path);
        if !self.sessions.exists(&meeting_id) {
            remove_if_exists(&wav_path);
        }
    }

    async fn run_stages(
        &self,
        meeting_id: &str,
        upload_path: &Path,
        wav_path: &Path,
        device_id: &str,
        tx: &mpsc::Sender<PipelineEvent>,
    ) -> Result<StageEnd, PipelineError> {
        self.sessions.sweep_expired(SESSION_TTL);
        self.sessions.cleanup_for_device(device_id);

        if progress(
            tx,
            "transcribing",
            "Transcribing audio (this takes a while for longer recordings)...",
        )
        .await
        .is_err()
        {
            return Ok(StageEnd::Cancelled);
        }

        let transcript = self.diarizer.transcribe(upload_path).await?;

        if transcript.utterances.is_empty() {
            let _ = tx
                .send(PipelineEvent::Done(Box::new(IdentifyOutcome {
                    success: true,
                    meeting_id: None,
                    speakers: Vec::new(),
                    utterances: Vec::new(),
                    audio_duration_ms: transcript.audio_duration_ms,
                    language: transcript.language,
                    message: Some("No speech detected in audio".to_string()),
                })))
                .await;
            return Ok(StageEnd::Finished);
        }

        if progress(tx, "converting", "Converting audio format...")
            .await
            .is_err()
        {
            return Ok(StageEnd::Cancelled);
        }

        let convert_in = upload_path.to_owned();
        let convert_out = wav_path.to_owned();
        tokio::task::spawn_blocking(move || {
            voxid_audio::convert_to_wav_16k_mono(&convert_in, &convert_out)
        })
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))??;

        if progress(tx, "analyzing", "Analyzing speaker voices...")
            .await
            .is_err()
        {
            return Ok(StageEnd::Cancelled);
        }

        let gate = Arc::clone(&self.gate);
        let encoder = Arc::clone(&self.encoder);
        let selector = self.selector.clone();
        let utterances = transcript.utterances.clone();
        let analyze_path = wav_path.to_owned();
        let analysis = tokio::task::spawn_blocking(move || {
            analyze_speakers(&analyze_path, &utterances, gate.as_ref(), encoder.as_ref(), &selector)
        })
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))??;

        if progress(tx, "matching", "Matching speakers to voiceprints...")
            .await
            .is_err()
        {
            return Ok(StageEnd::Cancelled);
        }

        let matches =
            match_speakers(&analysis.embeddings, self.index.as_ref(), &self.matcher).await?;

        let mut speakers: BTreeMap<String, SpeakerReport> = BTreeMap::new();
        for (label, selection) in &analysis.selections {
            let matching = matches
                .get(label)
                .cloned()
                .unwrap_or_else(SpeakerMatch::unmatched);
            speakers.insert(
                label.clone(),
                SpeakerReport::new(
                    label.clone(),
                    matching,
                    selection.spans.clone(),
                    analysis.longest_ms[label],
                    selection.speech_ms,
                    selection.low_quality,
                ),
            );
        }

        let name_map: HashMap<String, String> = speakers
            .iter()
            .map(|(label, report)| {
                let name = report
                    .matching
                    .assigned_name
                    .clone()
                    .unwrap_or_else(|| format!("Unknown ({label})"));
                (label.clone(), name)
            })
            .collect();

        let labeled: Vec<LabeledUtterance> = transcript
            .utterances
            .iter()
            .map(|u| LabeledUtterance {
                speaker_id: u.speaker.clone(),
                speaker_name: name_map
                    .get(&u.speaker)
                    .cloned()
                    .unwrap_or_else(|| format!("Unknown ({})", u.speaker)),
                text: u.text.clone(),
                start_ms: u.start_ms,
                end_ms: u.end_ms,
            })
            .collect();

        let pending = MeetingSession::initial_pending(&speakers);
        info!(
            meeting_id,
            pending = pending.len(),
            speakers = speakers.len(),
            "speakers awaiting user action"
        );

        let session = MeetingSession {
            meeting_id: meeting_id.to_string(),
            device_id: device_id.to_string(),
            audio_path: wav_path.to_owned(),
            created_at: Instant::now(),
            speaker_segments: analysis
                .selections
                .iter()
                .map(|(label, s)| (label.clone(), s.spans.clone()))
                .collect(),
            speaker_embeddings: analysis.embeddings.clone().into_iter().collect(),
            utterances: transcript.utterances,
            audio_duration_ms: transcript.audio_duration_ms,
            language: transcript.language.clone(),
            pending_speakers: pending,
            handled_speakers: BTreeSet::new(),
            summary: None,
            speakers: speakers.clone(),
        };
        self.sessions.insert(session);

        telemetry::meeting_processed(device_id, transcript.audio_duration_ms, speakers.len());

        let _ = tx
            .send(PipelineEvent::Done(Box::new(IdentifyOutcome {
                success: true,
                meeting_id: Some(meeting_id.to_string()),
                speakers: speakers.into_values().collect(),
                utterances: labeled,
                audio_duration_ms: transcript.audio_duration_ms,
                language: transcript.language,
                message: None,
            })))
            .await;

        Ok(StageEnd::Finished)
    }
}

async fn progress(
    tx: &mpsc::Sender<PipelineEvent>,
    stage: &'static str,
    message: &'static str,
) -> Result<(), ()> {
    tx.send(PipelineEvent::Progress { stage, message })
        .await
        .map_err(|_| ())
}

struct SpeakerAnalysis {
    embeddings: BTreeMap<String, Vec<f32>>,
    selections: BTreeMap<String, Selection>,
    longest_ms: BTreeMap<String, u64>,
}

/// Per-speaker segment selection and embedding over the converted WAV.
///
/// The WAV is loaded once and sliced in memory for every speaker. A
/// speaker whose audio cannot produce an embedding (no qualifying
/// utterances, or too little speech after VAD) simply has no entry in
/// `embeddings` and gets a placeholder match downstream.
fn analyze_speakers(
    wav_path: &Path,
    utterances: &[Utterance],
    gate: &dyn SpeechGate,
    encoder: &dyn SpeakerEncoder,
    selector: &SelectorConfig,
) -> Result<SpeakerAnalysis, PipelineError> {
    let buffer = WavBuffer::load(wav_path)?;
    info!(
        duration_ms = buffer.duration_ms(),
        "meeting WAV loaded for segment extraction"
    );

    let labels: BTreeSet<&str> = utterances.iter().map(|u| u.speaker.as_str()).collect();

    let mut embeddings = BTreeMap::new();
    let mut selections = BTreeMap::new();
    let mut longest_ms = BTreeMap::new();

    for label in labels {
        let speaker_utts: Vec<&Utterance> = utterances
            .iter()
            .filter(|u| u.speaker == label)
            .collect();
        longest_ms.insert(
            label.to_string(),
            speaker_utts
                .iter()
                .map(|u| u.duration_ms())
                .max()
                .unwrap_or(0),
        );

        let selection = select_segments(label, &speaker_utts, &buffer, gate, selector)?;
        if selection.is_empty() {
            info!(speaker = label, "no embeddable audio for speaker");
            selections.insert(label.to_string(), selection);
            continue;
        }

        match encoder.embed(&selection.samples) {
            Ok(embedding) => {
                embeddings.insert(label.to_string(), embedding);
            }
            Err(MlError::InvalidAudio(reason)) => {
                warn!(speaker = label, reason, "speaker not embeddable");
            }
            Err(e) => return Err(e.into()),
        }
        selections.insert(label.to_string(), selection);
    }

    info!(
        embedded = embeddings.len(),
        total = selections.len(),
        "speaker embeddings extracted"
    );

    Ok(SpeakerAnalysis {
        embeddings,
        selections,
        longest_ms,
    })
}

fn remove_if_exists(path: &Path) {
    if path.exists()
        && let Err(e) = std::fs::remove_file(path)
    {
        warn!(path = %path.display(), error = %e, "failed to remove temp file");
    }
}
