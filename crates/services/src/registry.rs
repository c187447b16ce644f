//! Voiceprint registry: enrollment gates, weighted-average and EMA profile
//! updates, and the local mirror kept in step with the vector index.

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use voxid_audio::AudioError;
use voxid_ml::{MlError, SpeakerEncoder, SpeechGate, normalize};

use crate::mirror::{MirrorError, SpeakerMirror};
use crate::vector::{VectorError, VectorIndex};

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Raw recording must be at least this long.
    pub min_enroll_duration_ms: u64,
    /// VAD-detected speech must be at least this long.
    pub min_enroll_speech_ms: u64,
    /// Speech below this (but above the gate) yields a warning.
    pub speech_warning_ms: u64,
    /// Recordings shorter than this get a soft duration warning.
    pub advice_short_ms: u64,
    /// Recordings longer than this get a soft duration warning.
    pub advice_long_ms: u64,
    /// EMA decay factor once the profile has a stable baseline.
    pub ema_alpha: f32,
    /// Weighted averaging applies until the profile reaches this many samples.
    pub ema_min_samples: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            min_enroll_duration_ms: 5_000,
            min_enroll_speech_ms: 3_000,
            speech_warning_ms: 5_000,
            advice_short_ms: 10_000,
            advice_long_ms: 60_000,
            ema_alpha: 0.3,
            ema_min_samples: 4,
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Speaker name is required")]
    EmptyName,
    #[error("Audio too short ({actual_ms}ms). Need at least {required_ms}ms")]
    AudioTooShort { actual_ms: u64, required_ms: u64 },
    #[error("Not enough speech detected ({speech_ms}ms). Try recording in a quieter environment")]
    InsufficientSpeech { speech_ms: u64 },
    #[error("Speaker '{0}' not found")]
    UnknownSpeaker(String),
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Ml(#[from] MlError),
    #[error(transparent)]
    Vector(#[from] VectorError),
    #[error("Enrollment task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone)]
pub struct EnrollOutcome {
    pub name: String,
    pub total_samples: u32,
    pub warning: Option<String>,
}

/// Registry of enrolled voiceprints. The vector index holds the vectors;
/// the mirror accelerates listings; per-name mutexes serialize the
/// read-modify-write update cycle so concurrent enrollments for the same
/// name cannot interleave.
pub struct VoiceprintRegistry {
    index: Arc<dyn VectorIndex>,
    mirror: Arc<SpeakerMirror>,
    gate: Arc<dyn SpeechGate>,
    encoder: Arc<dyn SpeakerEncoder>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    config: RegistryConfig,
}

impl VoiceprintRegistry {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        mirror: Arc<SpeakerMirror>,
        gate: Arc<dyn SpeechGate>,
        encoder: Arc<dyn SpeakerEncoder>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            index,
            mirror,
            gate,
            encoder,
            locks: DashMap::new(),
            config,
        }
    }

    /// Enrolls a speaker from a dedicated recording.
    ///
    /// Gates: raw duration >= 5s, VAD speech >= 3s. Returns the new sample
    /// count plus an optional advisory warning (short speech, short or
    /// overlong recording).
    pub async fn enroll(
        &self,
        name: &str,
        audio_path: &Path,
        weight: u32,
    ) -> Result<EnrollOutcome, RegistryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }

        let config = self.config.clone();
        let gate = Arc::clone(&self.gate);
        let encoder = Arc::clone(&self.encoder);
        let path = audio_path.to_owned();

        // Decode, VAD and embedding are CPU-bound; keep them off the
        // event loop.
        let (embedding, warning) = tokio::task::spawn_blocking(
            move || -> Result<(Vec<f32>, Option<String>), RegistryError> {
                let samples = voxid_audio::decode_any(&path)?;
                let duration_ms = voxid_audio::samples_to_ms(samples.len());

                if duration_ms < config.min_enroll_duration_ms {
                    return Err(RegistryError::AudioTooShort {
                        actual_ms: duration_ms,
                        required_ms: config.min_enroll_duration_ms,
                    });
                }

                let mut warning = if duration_ms < config.advice_short_ms {
                    Some(format!(
                        "Recording is {:.1}s. 10-30 seconds recommended for best results.",
                        duration_ms as f64 / 1000.0
                    ))
                } else if duration_ms > config.advice_long_ms {
                    Some(format!(
                        "Recording is {:.1}s. 15-30 seconds is sufficient.",
                        duration_ms as f64 / 1000.0
                    ))
                } else {
                    None
                };

                let speech_ms = gate.speech_duration_ms(&samples)?;
                info!(
                    raw_s = duration_ms as f64 / 1000.0,
                    speech_s = speech_ms as f64 / 1000.0,
                    "enrollment audio measured"
                );

                if speech_ms < config.min_enroll_speech_ms {
                    return Err(RegistryError::InsufficientSpeech { speech_ms });
                }
                if speech_ms < config.speech_warning_ms && warning.is_none() {
                    warning = Some(format!(
                        "Only {:.1}s of speech detected in {:.1}s recording. \
                         10+ seconds of speech recommended.",
                        speech_ms as f64 / 1000.0,
                        duration_ms as f64 / 1000.0
                    ));
                }

                let embedding = encoder.embed(&samples)?;
                Ok((embedding, warning))
            },
        )
        .await
        .map_err(|e| RegistryError::Task(e.to_string()))??;

        let total_samples = self.add_sample(name, &embedding, weight).await?;
        info!(speaker = name, total_samples, "speaker enrolled");

        Ok(EnrollOutcome {
            name: name.to_string(),
            total_samples,
            warning,
        })
    }

    /// Folds a pre-computed embedding into a speaker's profile.
    ///
    /// Weighted averaging builds the baseline; once the profile has
    /// `ema_min_samples` samples the update switches to an EMA so the
    /// profile keeps adapting without drifting on any single recording.
    /// The stored vector is renormalized after every update.
    pub async fn add_sample(
        &self,
        name: &str,
        embedding: &[f32],
        weight: u32,
    ) -> Result<u32, RegistryError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }

        let lock = self
            .locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let existing = self.index.fetch(name).await?;
        let (mut updated, total_samples) = match existing {
            None => (embedding.to_vec(), weight),
            Some(prior) => {
                let old = &prior.vector;
                let n_old = prior.sample_count;
                if n_old + 1 <= self.config.ema_min_samples {
                    let total = (n_old + weight) as f32;
                    let merged = old
                        .iter()
                        .zip(embedding)
                        .map(|(&o, &n)| (o * n_old as f32 + n * weight as f32) / total)
                        .collect();
                    (merged, n_old + weight)
                } else {
                    let alpha = self.config.ema_alpha;
                    let merged = old
                        .iter()
                        .zip(embedding)
                        .map(|(&o, &n)| (1.0 - alpha) * o + alpha * n)
                        .collect();
                    info!(speaker = name, alpha, "profile updated via EMA");
                    (merged, n_old + 1)
                }
            }
        };
        normalize(&mut updated);

        self.index.upsert(name, &updated, total_samples).await?;

        // The index write is authoritative; a mirror failure only degrades
        // the listing, so warn and rebuild rather than roll back.
        if let Err(e) = self.mirror.record(name, total_samples) {
            warn!(speaker = name, error = %e, "mirror update failed, scheduling rebuild");
            self.schedule_mirror_rebuild();
        }

        Ok(total_samples)
    }

    /// Removes a speaker from the index and the mirror.
    pub async fn delete(&self, name: &str) -> Result<(), RegistryError> {
        if !self.mirror.contains(name) {
            return Err(RegistryError::UnknownSpeaker(name.to_string()));
        }
        self.index.delete(name).await?;
        if let Err(e) = self.mirror.remove(name) {
            warn!(speaker = name, error = %e, "mirror remove failed, scheduling rebuild");
            self.schedule_mirror_rebuild();
        }
        self.locks.remove(name);
        info!(speaker = name, "speaker deleted");
        Ok(())
    }

    /// Lists enrolled speakers from the mirror.
    pub fn list(&self) -> Vec<(String, u32)> {
        self.mirror.entries()
    }

    /// Rebuilds the mirror from the vector index. Returns the speaker count.
    pub async fn sync_from_store(&self) -> Result<usize, RegistryError> {
        let listing = self.index.list_all().await?;
        let count = listing.len();
        self.mirror
            .replace_all(&listing)
            .map_err(|e: MirrorError| RegistryError::Task(e.to_string()))?;
        info!(count, "speaker mirror rebuilt from vector index");
        Ok(count)
    }

    fn schedule_mirror_rebuild(&self) {
        let index = Arc::clone(&self.index);
        let mirror = Arc::clone(&self.mirror);
        tokio::spawn(async move {
            match index.list_all().await {
                Ok(listing) => {
                    if let Err(e) = mirror.replace_all(&listing) {
                        warn!(error = %e, "scheduled mirror rebuild failed");
                    }
                }
                Err(e) => warn!(error = %e, "scheduled mirror rebuild could not list index"),
            }
        });
    }
}
