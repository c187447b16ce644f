//! `X-Device-ID` header extractor: an opaque per-client UUID used for
//! per-device single-flight and telemetry.

use axum::{extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;

#[derive(Debug, Clone)]
pub struct DeviceId(pub String);

impl<S> FromRequestParts<S> for DeviceId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let device = parts
            .headers
            .get("x-device-id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or("unknown")
            .to_string();
        Ok(DeviceId(device))
    }
}
