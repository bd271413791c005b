use thiserror::Error;

/// Failure taxonomy for one chat turn.
///
/// `Embedding` and `Retrieval` are recoverable: the orchestrator degrades to
/// the no-grounding prompt path instead of failing the request. Everything
/// else is terminal for the turn.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Chat not found")]
    NotFound,

    #[error("Embedding service error: {0}")]
    Embedding(String),

    #[error("Retrieval service error: {0}")]
    Retrieval(String),

    #[error("Completion service error: {0}")]
    Completion(String),

    #[error("Storage error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<redis::RedisError> for AgentError {
    fn from(e: redis::RedisError) -> Self {
        AgentError::Store(e.to_string())
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::Store(e.to_string())
    }
}
