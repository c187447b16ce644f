use axum::{
    Json,
    extract::{Form, State},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use voxid_services::matcher::Confidence;

use crate::{error::ApiError, state::AppState};

fn default_enroll() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ConfirmForm {
    pub meeting_id: String,
    pub speaker_id: String,
    pub confirmed_name: String,
    #[serde(default = "default_enroll")]
    pub enroll: bool,
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub ok: bool,
    pub enrolled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_samples: Option<u32>,
    pub session_cleaned_up: bool,
}

/// POST /api/confirm-speaker — confirm a medium-confidence match,
/// optionally reinforcing the confirmed speaker's voiceprint.
pub async fn confirm_speaker(
    State(state): State<AppState>,
    Form(form): Form<ConfirmForm>,
) -> Result<Json<ConfirmResponse>, ApiError> {
    let confirmed_name = form.confirmed_name.trim().to_string();
    if confirmed_name.is_empty() {
        return Err(ApiError::BadRequest("Confirmed name is required".into()));
    }

    let session = state
        .sessions
        .get(&form.meeting_id)
        .ok_or_else(|| ApiError::NotFound("Meeting session not found or expired".into()))?;
    let report = session.speakers.get(&form.speaker_id).ok_or_else(|| {
        ApiError::NotFound(format!("Speaker {} not found in meeting", form.speaker_id))
    })?;

    if !session.pending_speakers.contains(&form.speaker_id) {
        return Err(ApiError::BadRequest(format!(
            "Speaker {} is not awaiting confirmation",
            form.speaker_id
        )));
    }
    if report.matching.confidence != Confidence::Medium {
        return Err(ApiError::BadRequest(
            "Only medium-confidence matches can be confirmed".into(),
        ));
    }

    let mut enrolled = false;
    let mut total_samples = None;
    if form.enroll {
        // Reinforcement reuses the embedding computed during
        // identification; low-quality audio never feeds the profile.
        if report.low_quality {
            info!(
                speaker = %confirmed_name,
                label = %form.speaker_id,
                "skipping reinforcement, low speech quality"
            );
        } else if let Some(embedding) = session.speaker_embeddings.get(&form.speaker_id) {
            let total = state.registry.add_sample(&confirmed_name, embedding, 1).await?;
            total_samples = Some(total);
            enrolled = true;
            info!(
                speaker = %confirmed_name,
                meeting_id = %form.meeting_id,
                total,
                "speaker reinforced from meeting"
            );
        }
    }

    state
        .sessions
        .resolve_speaker(&form.meeting_id, &form.speaker_id, &confirmed_name)?;
    let session_cleaned_up = state.sessions.cleanup_if_complete(&form.meeting_id);

    Ok(Json(ConfirmResponse {
        ok: true,
        enrolled,
        total_samples,
        session_cleaned_up,
    }))
}
