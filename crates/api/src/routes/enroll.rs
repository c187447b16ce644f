use axum::{
    Json,
    extract::{Form, Multipart, State},
};
use serde::{Deserialize, Serialize};

use voxid_services::telemetry;

use crate::{error::ApiError, extractors::DeviceId, routes::upload_suffix, state::AppState};

#[derive(Debug, Serialize)]
pub struct EnrollResponse {
    pub speaker: String,
    pub total_samples: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// POST /api/enroll — enroll a speaker from a dedicated recording.
pub async fn enroll(
    State(state): State<AppState>,
    DeviceId(device_id): DeviceId,
    mut multipart: Multipart,
) -> Result<Json<EnrollResponse>, ApiError> {
    let mut name: Option<String> = None;
    let mut audio: Option<(String, axum::body::Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        match field.name() {
            Some("name") => {
                name = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::BadRequest(e.to_string()))?,
                );
            }
            Some("audio") => {
                let suffix = upload_suffix(field.file_name());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                audio = Some((suffix, bytes));
            }
            _ => {}
        }
    }

    let name = name.ok_or_else(|| ApiError::BadRequest("Speaker name is required".into()))?;
    let (suffix, bytes) =
        audio.ok_or_else(|| ApiError::BadRequest("Audio file is required".into()))?;

    // The temp file lives exactly as long as this handler.
    let temp = tempfile::Builder::new()
        .prefix("enroll_")
        .suffix(&suffix)
        .tempfile()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    tokio::fs::write(temp.path(), &bytes)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let outcome = state.registry.enroll(&name, temp.path(), 2).await?;
    telemetry::speaker_enrolled(&device_id);

    Ok(Json(EnrollResponse {
        speaker: outcome.name,
        total_samples: outcome.total_samples,
        warning: outcome.warning,
    }))
}

#[derive(Debug, Deserialize)]
pub struct EnrollFromMeetingForm {
    pub meeting_id: String,
    pub speaker_id: String,
    pub speaker_name: String,
}

#[derive(Debug, Serialize)]
pub struct EnrollFromMeetingResponse {
    pub speaker: String,
    pub total_samples: u32,
    pub session_cleaned_up: bool,
}

/// POST /api/enroll-from-meeting — register a diarized speaker under a new
/// name, reusing the embedding computed during identification.
pub async fn enroll_from_meeting(
    State(state): State<AppState>,
    DeviceId(device_id): DeviceId,
    Form(form): Form<EnrollFromMeetingForm>,
) -> Result<Json<EnrollFromMeetingResponse>, ApiError> {
    let name = form.speaker_name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Speaker name is required".into()));
    }

    let session = state
        .sessions
        .get(&form.meeting_id)
        .ok_or_else(|| ApiError::NotFound("Meeting session not found or expired".into()))?;
    let report = session.speakers.get(&form.speaker_id).ok_or_else(|| {
        ApiError::NotFound(format!("Speaker {} not found in meeting", form.speaker_id))
    })?;

    if report.low_quality {
        return Err(ApiError::BadRequest(format!(
            "Not enough speech from speaker {} for enrollment ({:.1}s)",
            form.speaker_id,
            report.speech_ms as f64 / 1000.0
        )));
    }
    let embedding = session
        .speaker_embeddings
        .get(&form.speaker_id)
        .ok_or_else(|| {
            ApiError::BadRequest(format!(
                "No usable audio for speaker {}",
                form.speaker_id
            ))
        })?;

    let total_samples = state.registry.add_sample(&name, embedding, 1).await?;
    state
        .sessions
        .resolve_speaker(&form.meeting_id, &form.speaker_id, &name)?;
    let session_cleaned_up = state.sessions.cleanup_if_complete(&form.meeting_id);

    telemetry::speaker_enrolled(&device_id);

    Ok(Json(EnrollFromMeetingResponse {
        speaker: name,
        total_samples,
        session_cleaned_up,
    }))
}
