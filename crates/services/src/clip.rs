//! Playback clips: a short, VAD-cleaned sample of one speaker's voice,
//! cut from the identification segments stored in the session.

use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use voxid_audio::{AudioError, WavBuffer};
use voxid_ml::{MlError, SpeechGate};

use crate::session::MeetingSession;

#[derive(Debug, Clone)]
pub struct ClipConfig {
    pub max_duration_ms: u64,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            max_duration_ms: 5_000,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClipError {
    #[error("Speaker {0} not found in meeting")]
    SpeakerNotFound(String),
    #[error("Audio file no longer available")]
    AudioMissing,
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Ml(#[from] MlError),
}

/// Builds the playback clip for one speaker and writes it next to the
/// session audio as `{meeting_id}_{label}_clip.wav` (so session cleanup
/// sweeps it up). Returns the clip path.
///
/// Blocking: decode + VAD; call from a worker thread.
pub fn build_clip(
    session: &MeetingSession,
    label: &str,
    gate: &dyn SpeechGate,
    config: &ClipConfig,
) -> Result<PathBuf, ClipError> {
    let spans = session
        .speaker_segments
        .get(label)
        .filter(|spans| !spans.is_empty())
        .ok_or_else(|| ClipError::SpeakerNotFound(label.to_string()))?;

    if !session.audio_path.exists() {
        return Err(ClipError::AudioMissing);
    }

    let buffer = WavBuffer::load(&session.audio_path)?;
    let raw: Vec<(u64, u64)> = spans.iter().map(|s| (s.start, s.end)).collect();
    let stitched = buffer.stitch_ms(&raw);

    let mut cleaned = gate.strip_silence(&stitched)?;
    cleaned.truncate(voxid_audio::ms_to_samples(config.max_duration_ms));

    let clip_path = session
        .audio_path
        .parent()
        .unwrap_or_else(|| std::path::Path::new("."))
        .join(format!("{}_{}_clip.wav", session.meeting_id, label));
    voxid_audio::write_wav_16k_mono(&clip_path, &cleaned)?;

    info!(
        meeting_id = %session.meeting_id,
        label,
        clip_ms = voxid_audio::samples_to_ms(cleaned.len()),
        "speaker clip built"
    );
    Ok(clip_path)
}
