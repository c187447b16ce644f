use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

use voxid_ml::MlError;
use voxid_services::clip::ClipError;
use voxid_services::pipeline::PipelineError;
use voxid_services::providers::ProviderError;
use voxid_services::registry::RegistryError;
use voxid_services::session::SessionError;
use voxid_services::vector::VectorError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Busy(String),
    BadGateway(String),
    Internal(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {msg}"),
            ApiError::NotFound(msg) => write!(f, "Not found: {msg}"),
            ApiError::Busy(msg) => write!(f, "Busy: {msg}"),
            ApiError::BadGateway(msg) => write!(f, "Bad gateway: {msg}"),
            ApiError::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Busy(msg) => (StatusCode::CONFLICT, "busy", msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "provider_error", msg),
            ApiError::Internal(detail) => {
                // Full detail stays in the log; clients get a generic body.
                error!(detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::EmptyName
            | RegistryError::AudioTooShort { .. }
            | RegistryError::InsufficientSpeech { .. } => ApiError::BadRequest(err.to_string()),
            RegistryError::UnknownSpeaker(_) => ApiError::NotFound(err.to_string()),
            RegistryError::Audio(e) => ApiError::BadRequest(format!("Could not decode audio: {e}")),
            RegistryError::Ml(MlError::InvalidAudio(msg)) => {
                ApiError::BadRequest(format!("Invalid audio: {msg}"))
            }
            RegistryError::Ml(e) => ApiError::Internal(e.to_string()),
            RegistryError::Vector(e) => e.into(),
            RegistryError::Task(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<VectorError> for ApiError {
    fn from(err: VectorError) -> Self {
        ApiError::BadGateway(format!("Vector index unavailable: {err}"))
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        ApiError::BadGateway(err.to_string())
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        ApiError::NotFound(err.to_string())
    }
}

impl From<ClipError> for ApiError {
    fn from(err: ClipError) -> Self {
        match err {
            ClipError::SpeakerNotFound(_) | ClipError::AudioMissing => {
                ApiError::NotFound(err.to_string())
            }
            ClipError::Audio(e) => ApiError::Internal(e.to_string()),
            ClipError::Ml(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Provider(e) => e.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
