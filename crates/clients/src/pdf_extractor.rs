use serde::Deserialize;
use serde_json::Value;

use crate::error::ClientError;

#[derive(Debug, Deserialize)]
pub struct ExtractedPage {
    pub page: u32,
    pub text: String,
    #[serde(default)]
    pub bbox: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ExtractionResponse {
    pub text_content: Vec<ExtractedPage>,
    #[serde(default)]
    pub metadata: Value,
    pub total_pages: u32,
}

impl ExtractionResponse {
    /// Pages with non-empty text, in page order. Empty-text pages are allowed upstream
    /// but must be skipped by any consumer building chunks.
    pub fn non_empty_pages(&self) -> impl Iterator<Item = &ExtractedPage> {
        self.text_content.iter().filter(|p| !p.text.is_empty())
    }
}

/// HTTP client for the out-of-scope PDF extraction service.
pub struct PdfExtractorClient {
    http: reqwest::Client,
    base_url: String,
}

impl PdfExtractorClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub async fn extract(&self, file_path: &str) -> Result<ExtractionResponse, ClientError> {
        let url = format!("{}/extract", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "file_path": file_path }))
            .send()
            .await?;
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

    #[test]
    fn non_empty_pages_skips_blank_text() {
        let resp = ExtractionResponse {
            text_content: vec![
                ExtractedPage { page: 1, text: "hello".into(), bbox: None },
                ExtractedPage { page: 2, text: "".into(), bbox: None },
                ExtractedPage { page: 3, text: "world".into(), bbox: None },
            ],
            metadata: Value::Null,
            total_pages: 3,
        };
        let pages: Vec<u32> = resp.non_empty_pages().map(|p| p.page).collect();
        assert_eq!(pages, vec![1, 3]);
    }
}
