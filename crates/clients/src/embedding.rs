use serde::{Deserialize, Serialize};

use crate::error::ClientError;

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
}

#[derive(Debug, Deserialize)]
pub struct EmbedResponse {
    pub embeddings: Vec<Vec<f32>>,
    pub vector_size: u32,
    pub texts_processed: usize,
    pub processing_time: f64,
}

#[derive(Debug, Deserialize)]
pub struct BatchStatus {
    pub batch_id: String,
    pub status: String,
    pub progress: f32,
}

/// HTTP client for the embedding service's `/embed` and `/embed/batch` endpoints.
pub struct EmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    max_texts_per_call: usize,
    max_text_length: usize,
}

impl EmbeddingClient {
    pub fn new(base_url: impl Into<String>, max_texts_per_call: usize, max_text_length: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            max_texts_per_call,
            max_text_length,
        }
    }

    /// Embed a batch of texts. Empty strings are dropped before the call; an empty
    /// result after dropping, or any text exceeding `max_text_length`, is rejected
    /// locally rather than sent upstream.
    pub async fn embed(&self, texts: &[String]) -> Result<EmbedResponse, ClientError> {
        let filtered: Vec<String> = texts.iter().filter(|t| !t.is_empty()).cloned().collect();
        if filtered.is_empty() {
            return Err(ClientError::InvalidInput("no non-empty texts to embed".into()));
        }
        if filtered.len() > self.max_texts_per_call {
            return Err(ClientError::InvalidInput(format!(
                "{} texts exceeds max_texts_per_call={}",
                filtered.len(),
                self.max_texts_per_call
            )));
        }
        if let Some(offender) = filtered.iter().find(|t| t.chars().count() > self.max_text_length) {
            return Err(ClientError::InvalidInput(format!(
                "text of length {} exceeds max_text_length={}",
                offender.chars().count(),
                self.max_text_length
            )));
        }

        let url = format!("{}/embed", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&EmbedRequest { texts: &filtered })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, body });
        }

        response.json().await.map_err(ClientError::from)
    }

    pub async fn batch_status(&self, batch_id: &str) -> Result<BatchStatus, ClientError> {
        let url = format!("{}/batch/{batch_id}", self.base_url);
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, body });
        }
        response.json().await.map_err(ClientError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_all_empty_texts() {
        let client = EmbeddingClient::new("http://localhost:8001", 1000, 10_000);
        let texts = vec!["".to_string(), "".to_string()];
        let err = client.embed(&texts).await;
        assert!(matches!(err, Err(ClientError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn rejects_oversized_text() {
        let client = EmbeddingClient::new("http://localhost:8001", 1000, 4);
        let texts = vec!["way too long".to_string()];
        let err = client.embed(&texts).await;
        assert!(matches!(err, Err(ClientError::InvalidInput(_))));
    }
}
