use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    Dot,
}

#[derive(Debug, Serialize)]
struct CreateCollectionRequest {
    name: String,
    vector_size: u32,
    distance_metric: DistanceMetric,
}

#[derive(Debug, Serialize)]
pub struct Point {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Value,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    points: &'a [Point],
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    score_threshold: f32,
}

#[derive(Debug, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub vector_size: u32,
    pub points_count: u64,
}

/// HTTP client for the vector store's collection/point/search surface.
pub struct VectorStoreClient {
    http: reqwest::Client,
    base_url: String,
    collection_name: String,
}

impl VectorStoreClient {
    pub fn new(base_url: impl Into<String>, collection_name: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            collection_name: collection_name.into(),
        }
    }

    pub async fn ensure_collection(
        &self,
        vector_size: u32,
        distance_metric: DistanceMetric,
    ) -> Result<(), ClientError> {
        let url = format!("{}/collections", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&CreateCollectionRequest {
                name: self.collection_name.clone(),
                vector_size,
                distance_metric,
            })
            .send()
            .await?;
        if !response.status().is_success() && response.status().as_u16() != 409 {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, body });
        }
        Ok(())
    }

    pub async fn upsert(&self, points: &[Point]) -> Result<(), ClientError> {
        let url = format!("{}/collections/{}/points", self.base_url, self.collection_name);
        let response = self
            .http
            .post(&url)
            .json(&UpsertRequest { points })
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, body });
        }
        Ok(())
    }

    pub async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        score_threshold: f32,
    ) -> Result<SearchResponse, ClientError> {
        let url = format!("{}/collections/{}/search", self.base_url, self.collection_name);
        let response = self
            .http
            .post(&url)
            .json(&SearchRequest {
                vector,
                limit,
                score_threshold,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, body });
        }
        response.json().await.map_err(ClientError::from)
    }

    pub async fn info(&self) -> Result<CollectionInfo, ClientError> {
        let url = format!("{}/collections/{}/info", self.base_url, self.collection_name);
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, body });
        }
        response.json().await.map_err(ClientError::from)
    }
}
