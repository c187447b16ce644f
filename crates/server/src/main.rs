//! Composition root: configuration, model sessions, provider adapters,
//! stores, router, serve.

use std::sync::Arc;

use anyhow::Context;
use dashmap::DashSet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use voxid_api::{build_router, state::AppState};
use voxid_config::Config;
use voxid_ml::{EcapaEncoder, SpeechGate, Vad, VadConfig};
use voxid_services::clip::ClipConfig;
use voxid_services::matcher::MatcherConfig;
use voxid_services::mirror::SpeakerMirror;
use voxid_services::pipeline::IdentifyPipeline;
use voxid_services::providers::{AssemblyAiDiarizer, OpenAiSummarizer, SummaryWebhook};
use voxid_services::registry::{RegistryConfig, VoiceprintRegistry};
use voxid_services::selector::SelectorConfig;
use voxid_services::session::SessionStore;
use voxid_services::vector::{PineconeIndex, VectorIndex};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("configuration")?;

    // Stale per-meeting audio from a previous run is unreachable; start clean.
    if config.audio_dir.exists() {
        if let Err(e) = std::fs::remove_dir_all(&config.audio_dir) {
            warn!(dir = %config.audio_dir.display(), error = %e, "could not clear audio dir");
        }
    }
    std::fs::create_dir_all(&config.audio_dir).context("creating audio dir")?;

    let gate: Arc<dyn SpeechGate> = Arc::new(
        Vad::silero(&config.vad_model_path, VadConfig::default())
            .context("loading VAD model")?,
    );
    let encoder = Arc::new(
        EcapaEncoder::new(&config.encoder_model_path, Arc::clone(&gate))
            .context("loading speaker encoder model")?,
    );

    let index: Arc<dyn VectorIndex> = Arc::new(PineconeIndex::new(
        config.vector_index_host.clone(),
        config.vector_api_key.clone(),
    ));
    let mirror = Arc::new(SpeakerMirror::open(config.mirror_path.clone()).context("mirror")?);
    let registry = Arc::new(VoiceprintRegistry::new(
        Arc::clone(&index),
        mirror,
        Arc::clone(&gate),
        encoder.clone(),
        RegistryConfig::default(),
    ));

    // The vector index is the source of truth; a failed sync keeps the
    // local mirror usable.
    match registry.sync_from_store().await {
        Ok(count) => info!(count, "speakers synced from vector index"),
        Err(e) => warn!(error = %e, "could not sync speakers, using local mirror"),
    }

    let sessions = Arc::new(SessionStore::new(config.audio_dir.clone()));

    let pipeline = Arc::new(IdentifyPipeline {
        diarizer: Arc::new(AssemblyAiDiarizer::new(config.transcription_api_key.clone())),
        gate: Arc::clone(&gate),
        encoder,
        index,
        sessions: Arc::clone(&sessions),
        selector: SelectorConfig::default(),
        matcher: MatcherConfig::default(),
    });

    let state = AppState {
        registry,
        sessions,
        pipeline,
        summarizer: Arc::new(OpenAiSummarizer::new(
            config.summary_api_key.clone(),
            config.summary_model.clone(),
        )),
        webhook: SummaryWebhook::new(config.summary_webhook_url.clone()),
        gate,
        clip: ClipConfig::default(),
        active_jobs: Arc::new(DashSet::new()),
    };

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "voxid server listening");

    axum::serve(listener, app).await.context("server")?;
    Ok(())
}
