use async_trait::async_trait;
use reqwest::{ Client as HttpClient, header::AUTHORIZATION };
use serde::{ Deserialize, Serialize };

use super::{ EmbeddingClient, EmbeddingResponse };
use crate::error::AgentError;
use crate::llm::LlmConfig;

pub struct OpenAIEmbeddingClient {
    http: HttpClient,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAIEmbeddingClient {
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Self {
        Self {
            http: HttpClient::new(),
            api_key,
            model: model.unwrap_or_else(|| "text-embedding-ada-002".to_string()),
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, AgentError> {
        let api_key = config.api_key
            .clone()
            .ok_or_else(||
                AgentError::Config(
                    "OpenAI API key is required for OpenAIEmbeddingClient".to_string()
                )
            )?;
        Ok(Self::new(api_key, config.embedding_model.clone(), config.base_url.clone()))
    }
}

#[async_trait]
impl EmbeddingClient for OpenAIEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<EmbeddingResponse, AgentError> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let req = EmbeddingRequest {
            model: self.model.clone(),
            input: vec![text.to_string()],
        };

        let resp = self.http
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&req)
            .send().await
            .map_err(|e| AgentError::Embedding(format!("OpenAI request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| AgentError::Embedding(format!("OpenAI returned an error: {}", e)))?
            .json::<EmbeddingApiResponse>().await
            .map_err(|e| AgentError::Embedding(format!("Malformed embedding response: {}", e)))?;

        let embedding = resp.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(||
                AgentError::Embedding("OpenAI embedding generation returned no results".to_string())
            )?;

        if embedding.is_empty() {
            return Err(AgentError::Embedding("OpenAI returned an empty embedding".to_string()));
        }

        Ok(EmbeddingResponse { embedding })
    }
}
