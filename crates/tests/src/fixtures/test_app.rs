//! Spawns the real router on an ephemeral port with fake collaborators.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use serde_json::Value;

use voxid_api::{build_router, state::AppState};
use voxid_ml::vad::{EnergyScorer, Vad, VadConfig};
use voxid_ml::{SpeakerEncoder, SpeechGate};
use voxid_services::clip::ClipConfig;
use voxid_services::matcher::MatcherConfig;
use voxid_services::mirror::SpeakerMirror;
use voxid_services::pipeline::IdentifyPipeline;
use voxid_services::providers::{Summarizer, SummaryWebhook};
use voxid_services::registry::{RegistryConfig, VoiceprintRegistry};
use voxid_services::selector::SelectorConfig;
use voxid_services::session::SessionStore;
use voxid_services::vector::{MemoryIndex, VectorIndex};

use super::fakes::{ScriptedDiarizer, ScriptedSummarizer, ToneEncoder};

pub struct TestApp {
    pub base_url: String,
    pub client: reqwest::Client,
    pub diarizer: Arc<ScriptedDiarizer>,
    pub summarizer: Arc<ScriptedSummarizer>,
    pub sessions: Arc<SessionStore>,
    pub audio_dir: PathBuf,
    _tempdir: tempfile::TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let tempdir = tempfile::tempdir().unwrap();
        let audio_dir = tempdir.path().join("meeting_audio");
        std::fs::create_dir_all(&audio_dir).unwrap();

        let gate: Arc<dyn SpeechGate> = Arc::new(Vad::with_scorer(
            Box::new(EnergyScorer::default()),
            VadConfig::default(),
        ));
        let encoder: Arc<dyn SpeakerEncoder> = Arc::new(ToneEncoder);
        let index: Arc<dyn VectorIndex> = Arc::new(MemoryIndex::new());
        let mirror = Arc::new(SpeakerMirror::open(tempdir.path().join("speakers.json")).unwrap());

        let registry = Arc::new(VoiceprintRegistry::new(
            Arc::clone(&index),
            mirror,
            Arc::clone(&gate),
            Arc::clone(&encoder),
            RegistryConfig::default(),
        ));
        let sessions = Arc::new(SessionStore::new(audio_dir.clone()));
        let diarizer = Arc::new(ScriptedDiarizer::new());
        let summarizer = Arc::new(ScriptedSummarizer::new());

        let diarizer_dyn: Arc<dyn voxid_services::providers::Diarizer> = diarizer.clone();
        let pipeline = Arc::new(IdentifyPipeline {
            diarizer: diarizer_dyn,
            gate: Arc::clone(&gate),
            encoder,
            index,
            sessions: Arc::clone(&sessions),
            selector: SelectorConfig::default(),
            matcher: MatcherConfig::default(),
        });

        let summarizer_dyn: Arc<dyn Summarizer> = summarizer.clone();
        let state = AppState {
            registry,
            sessions: Arc::clone(&sessions),
            pipeline,
            summarizer: summarizer_dyn,
            webhook: SummaryWebhook::new(None),
            gate,
            clip: ClipConfig::default(),
            active_jobs: Arc::new(DashSet::new()),
        };

        let app = build_router(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            diarizer,
            summarizer,
            sessions,
            audio_dir,
            _tempdir: tempdir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// POST /api/enroll with a synthetic recording.
    pub async fn enroll(&self, name: &str, wav: Vec<u8>) -> reqwest::Response {
        let form = reqwest::multipart::Form::new().text("name", name.to_string()).part(
            "audio",
            reqwest::multipart::Part::bytes(wav).file_name("sample.wav"),
        );
        self.client
            .post(self.url("/api/enroll"))
            .multipart(form)
            .send()
            .await
            .unwrap()
    }

    /// POST /api/identify and collect the full SSE stream.
    pub async fn identify(&self, wav: Vec<u8>, device_id: &str) -> Vec<SseEvent> {
        let body = self.identify_raw(wav, device_id).await.text().await.unwrap();
        parse_sse(&body)
    }

    pub async fn identify_raw(&self, wav: Vec<u8>, device_id: &str) -> reqwest::Response {
        let form = reqwest::multipart::Form::new().part(
            "audio",
            reqwest::multipart::Part::bytes(wav).file_name("meeting.wav"),
        );
        self.client
            .post(self.url("/api/identify"))
            .header("x-device-id", device_id)
            .multipart(form)
            .send()
            .await
            .unwrap()
    }

    /// Runs identification and returns the `done` payload.
    pub async fn identify_done(&self, wav: Vec<u8>, device_id: &str) -> Value {
        let events = self.identify(wav, device_id).await;
        events
            .into_iter()
            .find(|e| e.event == "done")
            .expect("no done event")
            .data
    }

    pub async fn speaker_samples(&self, name: &str) -> Option<u32> {
        let body: Value = self
            .client
            .get(self.url("/api/speakers"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        body["speakers"].as_array().unwrap().iter().find_map(|s| {
            (s["name"] == name).then(|| s["samples"].as_u64().unwrap() as u32)
        })
    }

    /// Polls until `predicate` holds or the timeout elapses.
    pub async fn wait_until<F: Fn() -> bool>(&self, predicate: F, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if predicate() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        predicate()
    }

    /// Upload temp files currently sitting in the audio dir.
    pub fn upload_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(&self.audio_dir)
            .map(|entries| {
                entries
                    .flatten()
                    .map(|e| e.path())
                    .filter(|p| {
                        p.file_name()
                            .and_then(|n| n.to_str())
                            .is_some_and(|n| n.starts_with("upload_"))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event: String,
    pub data: Value,
}

/// Parses an SSE body into events, skipping comment heartbeats.
pub fn parse_sse(body: &str) -> Vec<SseEvent> {
    let mut events = Vec::new();
    for block in body.split("\n\n") {
        let mut event = None;
        let mut data = String::new();
        for line in block.lines() {
            if let Some(rest) = line.strip_prefix("event:") {
                event = Some(rest.trim().to_string());
            } else if let Some(rest) = line.strip_prefix("data:") {
                data.push_str(rest.trim());
            }
            // Lines starting with ':' are heartbeat comments.
        }
        if let Some(event) = event {
            let data = serde_json::from_str(&data).unwrap_or(Value::Null);
            events.push(SseEvent { event, data });
        }
    }
    events
}
