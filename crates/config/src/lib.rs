//! Environment-driven configuration for the voxid server.
//!
//! Required variables abort startup; tunables with sane defaults are optional.

use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid value for {var}: {value}")]
    InvalidVar { var: &'static str, value: String },
}

/// Top-level server configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Vector index REST endpoint (host incl. scheme).
    pub vector_index_host: String,
    /// Vector index API key.
    pub vector_api_key: String,
    /// Transcription + diarization provider API key.
    pub transcription_api_key: String,
    /// Summary provider API key.
    pub summary_api_key: String,
    /// Summary provider model name.
    pub summary_model: String,
    /// Optional webhook that receives generated summaries as JSON.
    pub summary_webhook_url: Option<String>,
    /// Scratch directory for meeting audio; wiped on startup.
    pub audio_dir: PathBuf,
    /// Path to the local voiceprint mirror file.
    pub mirror_path: PathBuf,
    /// Silero VAD ONNX model path.
    pub vad_model_path: PathBuf,
    /// Speaker encoder ONNX model path.
    pub encoder_model_path: PathBuf,
}

impl Config {
    /// Reads configuration from the environment.
    ///
    /// Errors on any missing required variable so the process fails fast
    /// instead of surfacing provider auth failures mid-request.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_addr: optional("VOXID_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8000".into()),
            vector_index_host: required("PINECONE_INDEX_HOST")?,
            vector_api_key: required("PINECONE_API_KEY")?,
            transcription_api_key: required("ASSEMBLYAI_API_KEY")?,
            summary_api_key: required("OPENAI_API_KEY")?,
            summary_model: optional("VOXID_SUMMARY_MODEL").unwrap_or_else(|| "gpt-4o-mini".into()),
            summary_webhook_url: optional("VOXID_SUMMARY_WEBHOOK_URL"),
            audio_dir: optional("VOXID_AUDIO_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("meeting_audio_temp")),
            mirror_path: optional("VOXID_SPEAKERS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("speakers.json")),
            vad_model_path: optional("VOXID_VAD_MODEL")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("models/silero_vad.onnx")),
            encoder_model_path: optional("VOXID_ENCODER_MODEL")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("models/ecapa_tdnn.onnx")),
        })
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    match optional(var) {
        Some(value) => Ok(value),
        None => {
            warn!(var, "required environment variable not set");
            Err(ConfigError::MissingVar(var))
        }
    }
}

fn optional(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}
