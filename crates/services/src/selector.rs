//! Per-speaker segment selection: assemble the stitched audio sample whose
//! speech content best supports identification, within speaker-level
//! bounds.

use tracing::{debug, info};

use voxid_audio::WavBuffer;
use voxid_ml::{MlError, SpeechGate};

use crate::{Span, Utterance};

#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Stop accumulating once this much post-VAD speech is collected.
    pub target_speech_ms: u64,
    /// A single dominant utterance is clipped to this length.
    pub max_single_ms: u64,
    /// Utterances shorter than this are never stitched.
    pub min_utterance_ms: u64,
    /// Never stitch more than this many utterances.
    pub max_count: usize,
    /// Below this much stitched speech the speaker is flagged low quality.
    pub min_identification_speech_ms: u64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            target_speech_ms: 10_000,
            max_single_ms: 20_000,
            min_utterance_ms: 2_000,
            max_count: 5,
            min_identification_speech_ms: 8_000,
        }
    }
}

/// Outcome of segment selection for one diarized speaker.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Chosen spans in temporal order.
    pub spans: Vec<Span>,
    /// Stitched 16 kHz mono samples, ready for embedding.
    pub samples: Vec<f32>,
    /// Post-VAD speech in the stitched audio.
    pub speech_ms: u64,
    pub low_quality: bool,
}

impl Selection {
    pub fn empty() -> Self {
        Self {
            spans: Vec::new(),
            samples: Vec::new(),
            speech_ms: 0,
            low_quality: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

/// Selects and stitches audio for one speaker's utterances.
///
/// A single utterance already meeting the speech target wins outright
/// (clipped to the single-utterance cap). Otherwise utterances are admitted
/// in descending duration order, gated at the minimum length, accumulating
/// measured post-VAD speech until the target, the count cap, or exhaustion.
/// The chosen spans are re-ordered by start time before stitching so the
/// output preserves the meeting's temporal flow.
pub fn select_segments(
    speaker_id: &str,
    utterances: &[&Utterance],
    buffer: &WavBuffer,
    gate: &dyn SpeechGate,
    config: &SelectorConfig,
) -> Result<Selection, MlError> {
    let Some(longest) = utterances.iter().max_by_key(|u| u.duration_ms()) else {
        return Ok(Selection::empty());
    };

    let mut chosen: Vec<Span> = Vec::new();

    if longest.duration_ms() >= config.target_speech_ms {
        let end = longest
            .end_ms
            .min(longest.start_ms + config.max_single_ms);
        chosen.push(Span::new(longest.start_ms, end));
        debug!(
            speaker = speaker_id,
            duration_ms = end - longest.start_ms,
            "single dominant utterance selected"
        );
    } else {
        let mut candidates: Vec<&Utterance> = utterances
            .iter()
            .copied()
            .filter(|u| u.duration_ms() >= config.min_utterance_ms)
            .collect();
        candidates.sort_by(|a, b| b.duration_ms().cmp(&a.duration_ms()));

        if candidates.is_empty() {
            info!(
                speaker = speaker_id,
                min_ms = config.min_utterance_ms,
                "no utterances pass the stitching length gate"
            );
            return Ok(Selection::empty());
        }

        let mut accumulated_speech_ms = 0u64;
        for utterance in candidates {
            let span = Span::new(utterance.start_ms, utterance.end_ms);
            let slice = buffer.slice_ms(span.start, span.end);
            let speech = gate.speech_duration_ms(slice)?;
            chosen.push(span);
            accumulated_speech_ms += speech;
            debug!(
                speaker = speaker_id,
                raw_ms = span.duration_ms(),
                speech_ms = speech,
                total_speech_ms = accumulated_speech_ms,
                "utterance admitted"
            );

            if accumulated_speech_ms >= config.target_speech_ms {
                break;
            }
            if chosen.len() >= config.max_count {
                break;
            }
        }
    }

    chosen.sort_by_key(|span| span.start);

    let spans_raw: Vec<(u64, u64)> = chosen.iter().map(|s| (s.start, s.end)).collect();
    let samples = buffer.stitch_ms(&spans_raw);
    let speech_ms = gate.speech_duration_ms(&samples)?;
    let low_quality = speech_ms < config.min_identification_speech_ms;

    info!(
        speaker = speaker_id,
        segments = chosen.len(),
        speech_ms,
        low_quality,
        "selection complete"
    );

    Ok(Selection {
        spans: chosen,
        samples,
        speech_ms,
        low_quality,
    })
}
