//! AssemblyAI transcription adapter: upload, create transcript with
//! speaker labels, poll until done.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{DiarizedTranscript, Diarizer, ProviderError};
use crate::Utterance;

const PROVIDER: &str = "assemblyai";
const DEFAULT_BASE_URL: &str = "https://api.assemblyai.com/v2";

pub struct AssemblyAiDiarizer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    /// Overall deadline for one transcription job.
    timeout: Duration,
    poll_interval: Duration,
}

impl AssemblyAiDiarizer {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(3),
        }
    }

    async fn upload(&self, audio_path: &Path) -> Result<String, ProviderError> {
        let bytes = tokio::fs::read(audio_path)
            .await
            .map_err(|e| ProviderError::Request {
                provider: PROVIDER,
                detail: format!("could not read upload: {e}"),
            })?;

        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .header("authorization", &self.api_key)
            .body(bytes)
            .send()
            .await
            .map_err(|e| ProviderError::Request {
                provider: PROVIDER,
                detail: e.to_string(),
            })?;

        let parsed: UploadResponse = ok_json(response).await?;
        Ok(parsed.upload_url)
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    upload_url: String,
}

#[derive(Deserialize)]
struct TranscriptResponse {
    id: String,
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    utterances: Option<Vec<ProviderUtterance>>,
    /// Seconds, per the provider API.
    #[serde(default)]
    audio_duration: Option<u64>,
    #[serde(default)]
    language_code: Option<String>,
}

#[derive(Deserialize)]
struct ProviderUtterance {
    speaker: String,
    text: String,
    start: u64,
    end: u64,
}

async fn ok_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Request {
            provider: PROVIDER,
            detail: format!("{status}: {body}"),
        });
    }
    response.json().await.map_err(|e| ProviderError::BadResponse {
        provider: PROVIDER,
        detail: e.to_string(),
    })
}

#[async_trait]
impl Diarizer for AssemblyAiDiarizer {
    async fn transcribe(&self, audio_path: &Path) -> Result<DiarizedTranscript, ProviderError> {
        let deadline = Instant::now() + self.timeout;

        let audio_url = self.upload(audio_path).await?;
        debug!("meeting audio uploaded to transcription provider");

        let response = self
            .client
            .post(format!("{}/transcript", self.base_url))
            .header("authorization", &self.api_key)
            .json(&json!({
                "audio_url": audio_url,
                "speaker_labels": true,
                "language_detection": true,
            }))
            .send()
            .await
            .map_err(|e| ProviderError::Request {
                provider: PROVIDER,
                detail: e.to_string(),
            })?;
        let created: TranscriptResponse = ok_json(response).await?;
        let transcript_id = created.id;

        loop {
            if Instant::now() >= deadline {
                return Err(ProviderError::Timeout {
                    provider: PROVIDER,
                    seconds: self.timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;

            let response = self
                .client
                .get(format!("{}/transcript/{transcript_id}", self.base_url))
                .header("authorization", &self.api_key)
                .send()
                .await
                .map_err(|e| ProviderError::Request {
                    provider: PROVIDER,
                    detail: e.to_string(),
                })?;
            let polled: TranscriptResponse = ok_json(response).await?;

            match polled.status.as_str() {
                "completed" => {
                    let utterances: Vec<Utterance> = polled
                        .utterances
                        .unwrap_or_default()
                        .into_iter()
                        .map(|u| Utterance {
                            speaker: u.speaker,
                            text: u.text,
                            start_ms: u.start,
                            end_ms: u.end,
                        })
                        .collect();
                    let language = polled
                        .language_code
                        .unwrap_or_else(|| "unknown".to_string());
                    info!(
                        utterances = utterances.len(),
                        language, "transcription complete"
                    );
                    return Ok(DiarizedTranscript {
                        utterances,
                        audio_duration_ms: polled.audio_duration.unwrap_or(0) * 1000,
                        language,
                    });
                }
                "error" => {
                    return Err(ProviderError::Request {
                        provider: PROVIDER,
                        detail: polled
                            .error
                            .unwrap_or_else(|| "transcription failed".to_string()),
                    });
                }
                other => debug!(status = other, "transcription still running"),
            }
        }
    }
}
