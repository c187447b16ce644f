//! External providers behind small traits: the transcription+diarization
//! service and the transcript summarizer. Concrete adapters live next to
//! the traits; tests substitute scripted fakes.

pub mod assemblyai;
pub mod openai;
pub mod webhook;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Utterance;

pub use assemblyai::AssemblyAiDiarizer;
pub use openai::OpenAiSummarizer;
pub use webhook::SummaryWebhook;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} request failed: {detail}")]
    Request {
        provider: &'static str,
        detail: String,
    },
    #[error("{provider} returned an unexpected response: {detail}")]
    BadResponse {
        provider: &'static str,
        detail: String,
    },
    #[error("{provider} timed out after {seconds}s")]
    Timeout {
        provider: &'static str,
        seconds: u64,
    },
}

/// Result of one diarized transcription run.
#[derive(Debug, Clone)]
pub struct DiarizedTranscript {
    /// Utterances ordered by start time, with provider-local speaker labels.
    pub utterances: Vec<Utterance>,
    pub audio_duration_ms: u64,
    /// Detected (or requested) language code, "unknown" when absent.
    pub language: String,
}

/// Transcription + diarization provider: audio file in, labeled
/// utterances out.
#[async_trait]
pub trait Diarizer: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<DiarizedTranscript, ProviderError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionItem {
    #[serde(default)]
    pub assignee: String,
    #[serde(default)]
    pub task: String,
}

/// Structured meeting summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingSummary {
    #[serde(default)]
    pub executive_summary: String,
    #[serde(default)]
    pub action_items: Vec<ActionItem>,
    #[serde(default)]
    pub key_decisions: Vec<String>,
    #[serde(default)]
    pub topics_discussed: Vec<String>,
}

/// Text summarization provider: labeled transcript in, structured
/// summary out.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, transcript: &str) -> Result<MeetingSummary, ProviderError>;
}

/// Formats labeled utterances as `Name: text` lines for the summarizer.
pub fn format_transcript(lines: &[(String, String)], max_chars: usize) -> String {
    let mut transcript = String::new();
    for (speaker, text) in lines {
        transcript.push_str(speaker);
        transcript.push_str(": ");
        transcript.push_str(text);
        transcript.push('\n');
        if transcript.len() > max_chars {
            transcript.truncate(max_chars);
            transcript.push_str("\n\n[Transcript truncated due to length...]");
            break;
        }
    }
    transcript
}
