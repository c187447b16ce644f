use std::sync::Arc;

use dashmap::DashSet;

use voxid_ml::SpeechGate;
use voxid_services::clip::ClipConfig;
use voxid_services::pipeline::IdentifyPipeline;
use voxid_services::providers::{Summarizer, SummaryWebhook};
use voxid_services::registry::VoiceprintRegistry;
use voxid_services::session::SessionStore;

/// Shared application state, built once in the composition root.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<VoiceprintRegistry>,
    pub sessions: Arc<SessionStore>,
    pub pipeline: Arc<IdentifyPipeline>,
    pub summarizer: Arc<dyn Summarizer>,
    pub webhook: SummaryWebhook,
    pub gate: Arc<dyn SpeechGate>,
    pub clip: ClipConfig,
    /// Devices with an identification job in flight (single-flight gate).
    pub active_jobs: Arc<DashSet<String>>,
}
