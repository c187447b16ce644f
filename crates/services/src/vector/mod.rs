//! Vector index adapter: named 192-float vectors with a sample-count
//! metadata field and cosine top-k queries.

pub mod pinecone;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

pub use pinecone::PineconeIndex;

#[derive(Debug, Error)]
pub enum VectorError {
    #[error("Vector index request failed: {0}")]
    Request(String),
    #[error("Vector index returned an unexpected response: {0}")]
    BadResponse(String),
}

/// A stored voiceprint vector with its accumulated sample count.
#[derive(Debug, Clone)]
pub struct StoredVoiceprint {
    pub vector: Vec<f32>,
    pub sample_count: u32,
}

/// The external vector index, reduced to the five operations the registry
/// and matcher need. Network errors are surfaced as-is; retry policy is the
/// caller's concern.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Replaces any prior record stored under `name`.
    async fn upsert(
        &self,
        name: &str,
        vector: &[f32],
        sample_count: u32,
    ) -> Result<(), VectorError>;

    async fn fetch(&self, name: &str) -> Result<Option<StoredVoiceprint>, VectorError>;

    async fn delete(&self, name: &str) -> Result<(), VectorError>;

    /// Top-k neighbors by cosine similarity, best first. Scores are in
    /// `[-1, 1]` exactly as the index reports them.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<(String, f32)>, VectorError>;

    async fn list_all(&self) -> Result<Vec<(String, u32)>, VectorError>;
}

/// Exact in-memory index. Used by the test suite and handy for local runs
/// without an external index; cosine scores match what a real index returns
/// for unit-norm vectors.
#[derive(Default)]
pub struct MemoryIndex {
    records: RwLock<HashMap<String, StoredVoiceprint>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(
        &self,
        name: &str,
        vector: &[f32],
        sample_count: u32,
    ) -> Result<(), VectorError> {
        self.records.write().insert(
            name.to_string(),
            StoredVoiceprint {
                vector: vector.to_vec(),
                sample_count,
            },
        );
        Ok(())
    }

    async fn fetch(&self, name: &str) -> Result<Option<StoredVoiceprint>, VectorError> {
        Ok(self.records.read().get(name).cloned())
    }

    async fn delete(&self, name: &str) -> Result<(), VectorError> {
        self.records.write().remove(name);
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<(String, f32)>, VectorError> {
        let mut scored: Vec<(String, f32)> = self
            .records
            .read()
            .iter()
            .map(|(name, record)| {
                (
                    name.clone(),
                    voxid_ml::cosine_similarity(vector, &record.vector),
                )
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn list_all(&self) -> Result<Vec<(String, u32)>, VectorError> {
        let mut all: Vec<(String, u32)> = self
            .records
            .read()
            .iter()
            .map(|(name, record)| (name.clone(), record.sample_count))
            .collect();
        all.sort();
        Ok(all)
    }
}
