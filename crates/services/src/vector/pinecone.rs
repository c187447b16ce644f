//! Pinecone-style REST adapter for the vector index.
//!
//! Talks straight to an index host (`https://<index>.svc.<env>.pinecone.io`)
//! with the api-key header. No retries here; errors bubble to the caller.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{StoredVoiceprint, VectorError, VectorIndex};

pub struct PineconeIndex {
    client: reqwest::Client,
    host: String,
    api_key: String,
}

impl PineconeIndex {
    pub fn new(host: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: host.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.host)
    }

    async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, VectorError> {
        let response = self
            .client
            .post(self.url(path))
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| VectorError::Request(e.to_string()))?;
        error_for_status(path, response).await
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Response, VectorError> {
        let response = self
            .client
            .get(self.url(path))
            .header("Api-Key", &self.api_key)
            .query(query)
            .send()
            .await
            .map_err(|e| VectorError::Request(e.to_string()))?;
        error_for_status(path, response).await
    }
}

async fn error_for_status(
    path: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, VectorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(VectorError::Request(format!(
        "{path} returned {status}: {body}"
    )))
}

#[derive(Deserialize)]
struct FetchResponse {
    #[serde(default)]
    vectors: HashMap<String, FetchedVector>,
}

#[derive(Deserialize)]
struct FetchedVector {
    values: Vec<f32>,
    #[serde(default)]
    metadata: Option<VectorMetadata>,
}

#[derive(Deserialize)]
struct VectorMetadata {
    #[serde(default)]
    sample_count: Option<f64>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    score: f32,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    vectors: Vec<ListedVector>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Deserialize)]
struct ListedVector {
    id: String,
}

#[derive(Deserialize)]
struct Pagination {
    next: Option<String>,
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(
        &self,
        name: &str,
        vector: &[f32],
        sample_count: u32,
    ) -> Result<(), VectorError> {
        self.post(
            "/vectors/upsert",
            json!({
                "vectors": [{
                    "id": name,
                    "values": vector,
                    "metadata": { "sample_count": sample_count },
                }]
            }),
        )
        .await?;
        debug!(name, sample_count, "voiceprint upserted");
        Ok(())
    }

    async fn fetch(&self, name: &str) -> Result<Option<StoredVoiceprint>, VectorError> {
        let response = self.get("/vectors/fetch", &[("ids", name)]).await?;
        let mut parsed: FetchResponse = response
            .json()
            .await
            .map_err(|e| VectorError::BadResponse(e.to_string()))?;

        Ok(parsed.vectors.remove(name).map(|v| StoredVoiceprint {
            vector: v.values,
            sample_count: v
                .metadata
                .and_then(|m| m.sample_count)
                .map(|c| c as u32)
                .unwrap_or(1),
        }))
    }

    async fn delete(&self, name: &str) -> Result<(), VectorError> {
        self.post("/vectors/delete", json!({ "ids": [name] })).await?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<(String, f32)>, VectorError> {
        let response = self
            .post(
                "/query",
                json!({
                    "vector": vector,
                    "topK": top_k,
                    "includeValues": false,
                    "includeMetadata": false,
                }),
            )
            .await?;
        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| VectorError::BadResponse(e.to_string()))?;

        Ok(parsed
            .matches
            .into_iter()
            .map(|m| (m.id, m.score))
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<(String, u32)>, VectorError> {
        // The list endpoint only returns ids; metadata comes from fetch.
        let mut ids: Vec<String> = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut query: Vec<(&str, &str)> = vec![("limit", "100")];
            if let Some(ref t) = token {
                query.push(("paginationToken", t.as_str()));
            }
            let response = self.get("/vectors/list", &query).await?;
            let parsed: ListResponse = response
                .json()
                .await
                .map_err(|e| VectorError::BadResponse(e.to_string()))?;
            ids.extend(parsed.vectors.into_iter().map(|v| v.id));
            match parsed.pagination.and_then(|p| p.next) {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        let mut all = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(100) {
            let query: Vec<(&str, &str)> = chunk.iter().map(|id| ("ids", id.as_str())).collect();
            let response = self.get("/vectors/fetch", &query).await?;
            let parsed: FetchResponse = response
                .json()
                .await
                .map_err(|e| VectorError::BadResponse(e.to_string()))?;
            for (id, v) in parsed.vectors {
                let samples = v
                    .metadata
                    .and_then(|m| m.sample_count)
                    .map(|c| c as u32)
                    .unwrap_or(1);
                all.push((id, samples));
            }
        }
        all.sort();
        Ok(all)
    }
}
