pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use std::sync::Arc;

use super::{ LlmConfig, LlmType };
use self::ollama::OllamaEmbeddingClient;
use self::openai::OpenAIEmbeddingClient;
use crate::error::AgentError;

#[derive(Debug, Clone)]
pub struct EmbeddingResponse {
    pub embedding: Vec<f32>,
}

/// Turns free text into a fixed-dimension vector via the provider's embedding
/// model. One outbound call per invocation, no retries at this layer.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<EmbeddingResponse, AgentError>;
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn EmbeddingClient>, AgentError> {
    let client: Arc<dyn EmbeddingClient> = match config.llm_type {
        LlmType::Ollama => Arc::new(OllamaEmbeddingClient::from_config(config)?),
        LlmType::OpenAI => Arc::new(OpenAIEmbeddingClient::from_config(config)?),
    };
    Ok(client)
}
