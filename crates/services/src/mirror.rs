//! Durable local mirror of the enrolled-speaker listing.
//!
//! A JSON object file `{ name: { samples, updated_at } }` that makes the
//! speakers endpoint fast without a round trip to the vector index. The
//! index is the source of truth; the mirror is rebuilt from it on startup
//! and on demand.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Failed to read speakers file: {0}")]
    Read(std::io::Error),
    #[error("Failed to write speakers file: {0}")]
    Write(std::io::Error),
    #[error("Speakers file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorEntry {
    pub samples: u32,
    pub updated_at: String,
}

pub struct SpeakerMirror {
    path: PathBuf,
    data: RwLock<BTreeMap<String, MirrorEntry>>,
}

impl SpeakerMirror {
    /// Opens the mirror, loading any existing file. A missing file is an
    /// empty mirror, not an error.
    pub fn open(path: PathBuf) -> Result<Self, MirrorError> {
        let data = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(MirrorError::Read)?;
            serde_json::from_str(&content)?
        } else {
            BTreeMap::new()
        };
        info!(path = %path.display(), speakers = data.len(), "speaker mirror loaded");
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.data.read().contains_key(name)
    }

    pub fn entries(&self) -> Vec<(String, u32)> {
        self.data
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.samples))
            .collect()
    }

    pub fn record(&self, name: &str, samples: u32) -> Result<(), MirrorError> {
        self.data.write().insert(
            name.to_string(),
            MirrorEntry {
                samples,
                updated_at: Utc::now().to_rfc3339(),
            },
        );
        self.save()
    }

    pub fn remove(&self, name: &str) -> Result<(), MirrorError> {
        self.data.write().remove(name);
        self.save()
    }

    /// Replaces the whole mirror with the authoritative listing.
    pub fn replace_all(&self, listing: &[(String, u32)]) -> Result<(), MirrorError> {
        let now = Utc::now().to_rfc3339();
        let mut data = self.data.write();
        data.clear();
        for (name, samples) in listing {
            data.insert(
                name.clone(),
                MirrorEntry {
                    samples: *samples,
                    updated_at: now.clone(),
                },
            );
        }
        drop(data);
        self.save()
    }

    /// Atomic write via temp file + rename so a crash never leaves a
    /// half-written listing behind.
    fn save(&self) -> Result<(), MirrorError> {
        let data = self.data.read();
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(MirrorError::Write)?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(&*data)?;
        std::fs::write(&tmp_path, content).map_err(MirrorError::Write)?;
        std::fs::rename(&tmp_path, &self.path).map_err(MirrorError::Write)
    }
}
