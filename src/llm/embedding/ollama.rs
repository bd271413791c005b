use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };

use super::{ EmbeddingClient, EmbeddingResponse };
use crate::error::AgentError;
use crate::llm::LlmConfig;

pub struct OllamaEmbeddingClient {
    http: HttpClient,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    prompt: String,
}

#[derive(Deserialize)]
struct EmbeddingApiResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbeddingClient {
    pub fn new(base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            http: HttpClient::new(),
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".to_string()),
            model: model.unwrap_or_else(|| "nomic-embed-text".to_string()),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, AgentError> {
        Ok(Self::new(config.base_url.clone(), config.embedding_model.clone()))
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<EmbeddingResponse, AgentError> {
        let url = format!("{}/api/embeddings", self.base_url.trim_end_matches('/'));
        let req = EmbeddingRequest {
            model: self.model.clone(),
            prompt: text.to_string(),
        };

        let resp = self.http
            .post(&url)
            .json(&req)
            .send().await
            .map_err(|e| AgentError::Embedding(format!("Ollama request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| AgentError::Embedding(format!("Ollama returned an error: {}", e)))?
            .json::<EmbeddingApiResponse>().await
            .map_err(|e| AgentError::Embedding(format!("Malformed embedding response: {}", e)))?;

        if resp.embedding.is_empty() {
            return Err(AgentError::Embedding("Ollama returned an empty embedding".to_string()));
        }

        Ok(EmbeddingResponse { embedding: resp.embedding })
    }
}
