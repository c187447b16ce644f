use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use voxid_services::clip::build_clip;
use voxid_services::session::SpeakerReport;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Serialize)]
pub struct MeetingSnapshot {
    pub meeting_id: String,
    pub speakers: Vec<SpeakerReport>,
    pub audio_duration_ms: u64,
    pub language: String,
    pub pending_speakers: Vec<String>,
    pub handled_speakers: Vec<String>,
}

/// GET /api/meeting/{meeting_id} — session snapshot.
pub async fn get_meeting(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
) -> Result<Json<MeetingSnapshot>, ApiError> {
    let session = state
        .sessions
        .get(&meeting_id)
        .ok_or_else(|| ApiError::NotFound("Meeting session not found or expired".into()))?;

    Ok(Json(MeetingSnapshot {
        meeting_id,
        speakers: session.speakers.into_values().collect(),
        audio_duration_ms: session.audio_duration_ms,
        language: session.language,
        pending_speakers: session.pending_speakers.into_iter().collect(),
        handled_speakers: session.handled_speakers.into_iter().collect(),
    }))
}

/// GET /api/meeting/{meeting_id}/speaker/{speaker_id}/clip — short
/// VAD-cleaned WAV of the speaker's identification audio.
pub async fn speaker_clip(
    State(state): State<AppState>,
    Path((meeting_id, speaker_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let session = state
        .sessions
        .get(&meeting_id)
        .ok_or_else(|| ApiError::NotFound("Meeting session not found or expired".into()))?;

    let gate = Arc::clone(&state.gate);
    let config = state.clip.clone();
    let label = speaker_id.clone();
    let clip_path = tokio::task::spawn_blocking(move || {
        build_clip(&session, &label, gate.as_ref(), &config)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    let bytes = tokio::fs::read(&clip_path)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/wav".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"speaker_{speaker_id}_clip.wav\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub ok: bool,
}

/// POST /api/meeting/{meeting_id}/cleanup — explicit session teardown.
pub async fn cleanup(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
) -> Result<Json<CleanupResponse>, ApiError> {
    if !state.sessions.delete(&meeting_id) {
        return Err(ApiError::NotFound("Meeting session not found".into()));
    }
    Ok(Json(CleanupResponse { ok: true }))
}
