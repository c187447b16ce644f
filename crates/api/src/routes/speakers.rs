use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Serialize)]
pub struct SpeakerEntry {
    pub name: String,
    pub samples: u32,
}

#[derive(Debug, Serialize)]
pub struct SpeakersResponse {
    pub speakers: Vec<SpeakerEntry>,
}

/// GET /api/speakers — enrolled speakers from the local mirror.
pub async fn list(State(state): State<AppState>) -> Json<SpeakersResponse> {
    let speakers = state
        .registry
        .list()
        .into_iter()
        .map(|(name, samples)| SpeakerEntry { name, samples })
        .collect();
    Json(SpeakersResponse { speakers })
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub ok: bool,
}

/// DELETE /api/speakers/{name} — remove a voiceprint.
pub async fn remove(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state.registry.delete(&name).await?;
    Ok(Json(DeleteResponse { ok: true }))
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub count: usize,
}

/// POST /api/speakers/sync — rebuild the mirror from the vector index.
pub async fn sync(State(state): State<AppState>) -> Result<Json<SyncResponse>, ApiError> {
    let count = state.registry.sync_from_store().await?;
    Ok(Json(SyncResponse { count }))
}
