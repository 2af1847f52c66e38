use serde::{Deserialize, Serialize};

use crate::error::ClientError;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub response_tokens: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

/// HTTP client for the LLM service's `/generate` and `/chat` endpoints. The Query
/// Orchestrator drives this through `generate`, using the prompt templates it builds.
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
}

impl LlmClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub async fn generate(
        &self,
        prompt: &str,
        model: Option<&str>,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<GenerateResponse, ClientError> {
        let url = format!("{}/generate", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&GenerateRequest {
                prompt,
                model,
                max_tokens,
                temperature,
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

    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<GenerateResponse, ClientError> {
        let url = format!("{}/chat", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&ChatRequest {
                messages,
                max_tokens,
                temperature,
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
}
