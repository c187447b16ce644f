//! Core services: voiceprint registry, segment selection, competitive
//! matching, meeting sessions, the identification pipeline and its
//! collaborator adapters.

pub mod clip;
pub mod matcher;
pub mod mirror;
pub mod pipeline;
pub mod providers;
pub mod registry;
pub mod selector;
pub mod session;
pub mod telemetry;
pub mod vector;

use serde::{Deserialize, Serialize};

/// One diarized utterance: provider speaker label plus timing in ms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    /// Provider-assigned opaque speaker label ("A", "B", ...).
    pub speaker: String,
    pub text: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl Utterance {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// A `[start_ms, end_ms)` span within the meeting audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: u64,
    pub end: u64,
}

impl Span {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn duration_ms(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}
