use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    response::sse::{Event, KeepAlive, Sse},
};
use dashmap::DashSet;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};
use tracing::info;

use voxid_services::pipeline::{HEARTBEAT_INTERVAL, PipelineEvent};

use crate::{error::ApiError, extractors::DeviceId, routes::upload_suffix, state::AppState};

/// Releases the device's single-flight slot when the job ends, however it
/// ends.
struct JobGuard {
    jobs: Arc<DashSet<String>>,
    device_id: String,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.jobs.remove(&self.device_id);
    }
}

/// POST /api/identify — run the identification pipeline, streaming
/// progress as Server-Sent Events with comment heartbeats.
pub async fn identify(
    State(state): State<AppState>,
    DeviceId(device_id): DeviceId,
    mut multipart: Multipart,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if !state.active_jobs.insert(device_id.clone()) {
        return Err(ApiError::Busy(
            "An identification is already running for this device".into(),
        ));
    }
    let guard = JobGuard {
        jobs: Arc::clone(&state.active_jobs),
        device_id: device_id.clone(),
    };

    let mut audio: Option<(String, axum::body::Bytes)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if field.name() == Some("audio") {
            let suffix = upload_suffix(field.file_name());
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            audio = Some((suffix, bytes));
        }
    }
    let (suffix, bytes) =
        audio.ok_or_else(|| ApiError::BadRequest("Audio file is required".into()))?;

    let audio_dir = state.sessions.audio_dir().to_owned();
    tokio::fs::create_dir_all(&audio_dir)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let upload_path = audio_dir.join(format!(
        "upload_{}{suffix}",
        uuid::Uuid::new_v4().simple()
    ));
    tokio::fs::write(&upload_path, &bytes)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    info!(device_id, upload = %upload_path.display(), "identification upload saved");

    let (tx, rx) = mpsc::channel::<PipelineEvent>(32);
    let pipeline = Arc::clone(&state.pipeline);
    tokio::spawn(async move {
        let _guard = guard;
        pipeline.run(upload_path, device_id, tx).await;
    });

    let stream = ReceiverStream::new(rx).map(|event| Ok(to_sse_event(event)));
    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    ))
}

fn to_sse_event(event: PipelineEvent) -> Event {
    let result = match event {
        PipelineEvent::Progress { stage, message } => Event::default()
            .event("progress")
            .json_data(json!({ "stage": stage, "message": message })),
        PipelineEvent::Done(outcome) => Event::default().event("done").json_data(&*outcome),
        PipelineEvent::Error { message } => Event::default()
            .event("error")
            .json_data(json!({ "message": message })),
    };
    result.unwrap_or_else(|_| {
        Event::default()
            .event("error")
            .data("{\"message\":\"Internal serialization error\"}")
    })
}
