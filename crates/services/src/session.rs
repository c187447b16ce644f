//! In-memory meeting sessions: everything the post-identification actions
//! (confirmation, enrollment, clips, summary) need, TTL-bound, with
//! cleanup that removes the audio artifacts along with the entry.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::matcher::{Confidence, SpeakerMatch};
use crate::providers::MeetingSummary;
use crate::{Span, Utterance};

/// Default session TTL.
pub const SESSION_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Meeting session not found or expired")]
    SessionNotFound,
    #[error("Speaker {0} not found in meeting")]
    SpeakerNotFound(String),
}

/// Per-speaker identification report, served to clients and kept in the
/// session for post-identification actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerReport {
    pub meeting_speaker_id: String,
    #[serde(flatten)]
    pub matching: SpeakerMatch,
    pub needs_confirmation: bool,
    pub needs_naming: bool,
    pub segments: Vec<Span>,
    pub longest_utterance_ms: u64,
    pub speech_ms: u64,
    pub low_quality: bool,
}

impl SpeakerReport {
    pub fn new(
        meeting_speaker_id: String,
        matching: SpeakerMatch,
        segments: Vec<Span>,
        longest_utterance_ms: u64,
        speech_ms: u64,
        low_quality: bool,
    ) -> Self {
        let needs_confirmation = matching.needs_confirmation();
        let needs_naming = matching.needs_naming();
        Self {
            meeting_speaker_id,
            matching,
            needs_confirmation,
            needs_naming,
            segments,
            longest_utterance_ms,
            speech_ms,
            low_quality,
        }
    }
}

/// Server-side state for one completed identification.
#[derive(Debug, Clone)]
pub struct MeetingSession {
    pub meeting_id: String,
    pub device_id: String,
    /// Converted 16 kHz mono WAV of the full meeting.
    pub audio_path: PathBuf,
    pub created_at: Instant,
    pub speakers: BTreeMap<String, SpeakerReport>,
    pub speaker_embeddings: HashMap<String, Vec<f32>>,
    pub speaker_segments: HashMap<String, Vec<Span>>,
    pub utterances: Vec<Utterance>,
    pub audio_duration_ms: u64,
    pub language: String,
    /// Labels still awaiting user action (medium + low at creation).
    pub pending_speakers: BTreeSet<String>,
    /// Labels the user has confirmed or enrolled. Disjoint from pending.
    pub handled_speakers: BTreeSet<String>,
    pub summary: Option<MeetingSummary>,
}

impl MeetingSession {
    /// Pending set as of creation: every label that did not come back high.
    pub fn initial_pending(speakers: &BTreeMap<String, SpeakerReport>) -> BTreeSet<String> {
        speakers
            .iter()
            .filter(|(_, report)| report.matching.confidence != Confidence::High)
            .map(|(label, _)| label.clone())
            .collect()
    }

    fn complete(&self) -> bool {
        self.pending_speakers.is_empty() && self.summary.is_some()
    }
}

/// Generates a fresh 128-bit meeting id rendered as 32 hex chars.
pub fn new_meeting_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

struct Inner {
    sessions: HashMap<String, MeetingSession>,
    /// Device -> its most recent meeting, for cleanup on re-identification.
    by_device: HashMap<String, String>,
}

/// Store of live meeting sessions. One mutex guards the whole map; every
/// operation is short and never blocks on IO while holding it (file
/// removal happens after release).
pub struct SessionStore {
    inner: Mutex<Inner>,
    audio_dir: PathBuf,
}

impl SessionStore {
    pub fn new(audio_dir: PathBuf) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sessions: HashMap::new(),
                by_device: HashMap::new(),
            }),
            audio_dir,
        }
    }

    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    pub fn insert(&self, session: MeetingSession) {
        let mut inner = self.inner.lock();
        inner
            .by_device
            .insert(session.device_id.clone(), session.meeting_id.clone());
        info!(meeting_id = %session.meeting_id, "meeting session stored");
        inner.sessions.insert(session.meeting_id.clone(), session);
    }

    pub fn get(&self, meeting_id: &str) -> Option<MeetingSession> {
        self.inner.lock().sessions.get(meeting_id).cloned()
    }

    pub fn exists(&self, meeting_id: &str) -> bool {
        self.inner.lock().sessions.contains_key(meeting_id)
    }

    /// Records a confirmed or enrolled identity on a speaker report and
    /// moves the label from pending to handled.
    pub fn resolve_speaker(
        &self,
        meeting_id: &str,
        label: &str,
        assigned_name: &str,
    ) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        let session = inner
            .sessions
            .get_mut(meeting_id)
            .ok_or(SessionError::SessionNotFound)?;
        let report = session
            .speakers
            .get_mut(label)
            .ok_or_else(|| SessionError::SpeakerNotFound(label.to_string()))?;

        report.matching.assigned_name = Some(assigned_name.to_string());
        report.matching.confidence = Confidence::High;
        report.needs_confirmation = false;
        report.needs_naming = false;

        session.pending_speakers.remove(label);
        session.handled_speakers.insert(label.to_string());
        info!(
            meeting_id,
            label,
            handled = session.handled_speakers.len(),
            pending = session.pending_speakers.len(),
            "speaker handled"
        );
        Ok(())
    }

    pub fn set_summary(
        &self,
        meeting_id: &str,
        summary: MeetingSummary,
    ) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        let session = inner
            .sessions
            .get_mut(meeting_id)
            .ok_or(SessionError::SessionNotFound)?;
        session.summary = Some(summary);
        Ok(())
    }

    /// Deletes the session once every pending speaker is handled and the
    /// summary has been generated. Returns whether cleanup ran.
    pub fn cleanup_if_complete(&self, meeting_id: &str) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            match inner.sessions.get(meeting_id) {
                Some(session) if session.complete() => self.take_session(&mut inner, meeting_id),
                _ => None,
            }
        };
        match removed {
            Some(session) => {
                info!(meeting_id, "session complete, cleaning up");
                self.remove_artifacts(&session);
                true
            }
            None => false,
        }
    }

    /// Unconditional deletion (explicit cleanup endpoint).
    pub fn delete(&self, meeting_id: &str) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            self.take_session(&mut inner, meeting_id)
        };
        match removed {
            Some(session) => {
                self.remove_artifacts(&session);
                true
            }
            None => false,
        }
    }

    /// Removes whatever session the device had before, making room for a
    /// new identification run.
    pub fn cleanup_for_device(&self, device_id: &str) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            match inner.by_device.get(device_id).cloned() {
                Some(meeting_id) => self.take_session(&mut inner, &meeting_id),
                None => None,
            }
        };
        match removed {
            Some(session) => {
                info!(
                    meeting_id = %session.meeting_id,
                    device_id,
                    "previous session cleaned up for new identification"
                );
                self.remove_artifacts(&session);
                true
            }
            None => false,
        }
    }

    /// Removes sessions older than `ttl`. Returns how many were removed.
    pub fn sweep_expired(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let expired: Vec<MeetingSession> = {
            let mut inner = self.inner.lock();
            let ids: Vec<String> = inner
                .sessions
                .iter()
                .filter(|(_, s)| now.duration_since(s.created_at) > ttl)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter()
                .filter_map(|id| self.take_session(&mut inner, id))
                .collect()
        };
        let count = expired.len();
        for session in &expired {
            self.remove_artifacts(session);
        }
        if count > 0 {
            info!(count, "expired meeting sessions cleaned up");
        }
        count
    }

    fn take_session(&self, inner: &mut Inner, meeting_id: &str) -> Option<MeetingSession> {
        let session = inner.sessions.remove(meeting_id)?;
        if inner
            .by_device
            .get(&session.device_id)
            .is_some_and(|m| m == meeting_id)
        {
            inner.by_device.remove(&session.device_id);
        }
        Some(session)
    }

    /// Unlinks the session WAV and any clip files derived from it.
    fn remove_artifacts(&self, session: &MeetingSession) {
        if session.audio_path.exists()
            && let Err(e) = std::fs::remove_file(&session.audio_path)
        {
            warn!(path = %session.audio_path.display(), error = %e, "failed to remove session audio");
        }

        let prefix = format!("{}_", session.meeting_id);
        if let Ok(entries) = std::fs::read_dir(&self.audio_dir) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.starts_with(&prefix) && name.ends_with("_clip.wav") {
                    if let Err(e) = std::fs::remove_file(entry.path()) {
                        warn!(file = %name, error = %e, "failed to remove clip file");
                    }
                }
            }
        }
    }
}
