//! Optional webhook notified when a meeting summary is generated.

use serde_json::json;
use tracing::{debug, warn};

use super::MeetingSummary;

#[derive(Clone)]
pub struct SummaryWebhook {
    client: reqwest::Client,
    url: Option<String>,
}

impl SummaryWebhook {
    pub fn new(url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    /// Posts the summary fire-and-forget. Failures are logged, never
    /// surfaced to the caller.
    pub fn notify(&self, meeting_id: &str, summary: &MeetingSummary) {
        let Some(url) = self.url.clone() else {
            return;
        };
        let client = self.client.clone();
        let body = json!({
            "meeting_id": meeting_id,
            "summary": summary,
        });
        let meeting_id = meeting_id.to_string();
        tokio::spawn(async move {
            match client.post(&url).json(&body).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(meeting_id, "summary webhook delivered");
                }
                Ok(response) => {
                    warn!(meeting_id, status = %response.status(), "summary webhook rejected");
                }
                Err(e) => warn!(meeting_id, error = %e, "summary webhook failed"),
            }
        });
    }
}
