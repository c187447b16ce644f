use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;

use voxid_services::providers::{MeetingSummary, format_transcript};
use voxid_services::telemetry;

use crate::{error::ApiError, extractors::DeviceId, state::AppState};

const MAX_TRANSCRIPT_CHARS: usize = 50_000;

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub meeting_id: String,
    pub summary: MeetingSummary,
}

/// POST /api/meeting/{meeting_id}/summary — generate and cache the
/// structured summary for the meeting transcript.
pub async fn create(
    State(state): State<AppState>,
    DeviceId(device_id): DeviceId,
    Path(meeting_id): Path<String>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let session = state
        .sessions
        .get(&meeting_id)
        .ok_or_else(|| ApiError::NotFound("Meeting session not found or expired".into()))?;

    if session.utterances.is_empty() {
        return Err(ApiError::BadRequest(
            "No transcript available to summarize".into(),
        ));
    }

    let name_map: HashMap<&str, String> = session
        .speakers
        .iter()
        .map(|(label, report)| {
            let name = report
                .matching
                .assigned_name
                .clone()
                .unwrap_or_else(|| format!("Speaker {label}"));
            (label.as_str(), name)
        })
        .collect();

    let lines: Vec<(String, String)> = session
        .utterances
        .iter()
        .map(|u| {
            let speaker = name_map
                .get(u.speaker.as_str())
                .cloned()
                .unwrap_or_else(|| format!("Speaker {}", u.speaker));
            (speaker, u.text.clone())
        })
        .collect();
    let transcript = format_transcript(&lines, MAX_TRANSCRIPT_CHARS);

    let summary = state.summarizer.summarize(&transcript).await?;

    state.sessions.set_summary(&meeting_id, summary.clone())?;
    state.webhook.notify(&meeting_id, &summary);
    telemetry::summary_generated(&device_id, session.speakers.len());

    // A summary may be the last thing the session was waiting on.
    state.sessions.cleanup_if_complete(&meeting_id);

    Ok(Json(SummaryResponse {
        meeting_id,
        summary,
    }))
}

/// GET /api/meeting/{meeting_id}/summary — cached summary, if generated.
pub async fn get_cached(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let session = state
        .sessions
        .get(&meeting_id)
        .ok_or_else(|| ApiError::NotFound("Meeting session not found or expired".into()))?;

    let summary = session.summary.ok_or_else(|| {
        ApiError::NotFound("Summary not yet generated. POST to create one.".into())
    })?;

    Ok(Json(SummaryResponse {
        meeting_id,
        summary,
    }))
}
