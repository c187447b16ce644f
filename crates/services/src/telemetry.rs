//! Lightweight usage telemetry as structured tracing events.
//!
//! Events carry the opaque per-device id only; no audio or transcript
//! content ever lands in telemetry.

use tracing::info;

pub fn speaker_enrolled(device_id: &str) {
    info!(target: "telemetry", event = "speaker.enrolled", device_id);
}

pub fn meeting_processed(device_id: &str, duration_ms: u64, speaker_count: usize) {
    info!(
        target: "telemetry",
        event = "meeting.processed",
        device_id,
        duration_ms,
        speaker_count
    );
}

pub fn summary_generated(device_id: &str, speaker_count: usize) {
    info!(
        target: "telemetry",
        event = "summary.generated",
        device_id,
        speaker_count
    );
}
