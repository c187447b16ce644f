//! OpenAI chat-completions adapter for transcript summarization.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{MeetingSummary, ProviderError, Summarizer};

const PROVIDER: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const SYSTEM_PROMPT: &str = "\
You are a meeting notes assistant. Extract important information concisely, \
ordered by priority. Analyze the transcript and provide:

1. executive_summary: main purpose and key outcomes.
2. action_items: JSON array of {\"assignee\": \"Name\", \"task\": \"description\"}, \
most critical first. Assignee is whoever volunteered or was asked. Skip \
trivial tasks; return [] if none.
3. key_decisions: JSON array of concise strings (under 15 words each), \
most significant first. Skip procedural decisions.
4. topics_discussed: main topics as short phrases (2-4 words each).

Speaker names appear before the colon (e.g. \"Shaun:\"). Always use that \
exact spelling; never use phonetic variants from the transcript text.

Respond in JSON format:
{\"executive_summary\": \"...\", \"action_items\": [...], \
\"key_decisions\": [...], \"topics_discussed\": [...]}";

pub struct OpenAiSummarizer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiSummarizer {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, transcript: &str) -> Result<MeetingSummary, ProviderError> {
        if transcript.trim().is_empty() {
            return Err(ProviderError::BadResponse {
                provider: PROVIDER,
                detail: "no transcript content to summarize".to_string(),
            });
        }

        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": SYSTEM_PROMPT },
                    { "role": "user", "content": format!(
                        "Please summarize this meeting transcript:\n\n{transcript}") },
                ],
                "response_format": { "type": "json_object" },
            }))
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| ProviderError::Timeout {
                provider: PROVIDER,
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| ProviderError::Request {
                provider: PROVIDER,
                detail: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Request {
                provider: PROVIDER,
                detail: format!("{status}: {body}"),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| ProviderError::BadResponse {
            provider: PROVIDER,
            detail: e.to_string(),
        })?;
        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| ProviderError::BadResponse {
                provider: PROVIDER,
                detail: "empty choices".to_string(),
            })?;

        let summary: MeetingSummary =
            serde_json::from_str(content).map_err(|e| ProviderError::BadResponse {
                provider: PROVIDER,
                detail: format!("summary is not valid JSON: {e}"),
            })?;

        info!(
            action_items = summary.action_items.len(),
            decisions = summary.key_decisions.len(),
            "summary generated"
        );
        Ok(summary)
    }
}
