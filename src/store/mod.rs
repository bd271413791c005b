mod memory;
mod redis;

pub use memory::MemoryConversationStore;
pub use redis::RedisConversationStore;

use async_trait::async_trait;
use log::info;
use std::sync::Arc;

use crate::cli::Args;
use crate::error::AgentError;
use crate::models::chat::{ ChatMessage, Conversation, Role };

/// Durable conversation/message state, scoped to an authenticated user id.
///
/// `append_message` is the only mutator of message state; conversations are
/// never updated in place except through it.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Most-recently-created conversation owned by `user_id`, or a fresh one
    /// when none exists. `force_new` always creates.
    async fn find_or_create_active(
        &self,
        user_id: &str,
        force_new: bool
    ) -> Result<Conversation, AgentError>;

    /// Conversation with its full ordered message log. `NotFound` when the id
    /// is unknown or not owned by `user_id`.
    async fn get_conversation(
        &self,
        user_id: &str,
        conversation_id: &str
    ) -> Result<Conversation, AgentError>;

    /// All of `user_id`'s conversations newest-first, each carrying at most
    /// its first message as a preview.
    async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>, AgentError>;

    /// Append one message. `NotFound` for an unknown conversation id.
    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str
    ) -> Result<ChatMessage, AgentError>;

    /// Delete all of `user_id`'s conversations with zero messages; returns
    /// how many were deleted.
    async fn delete_empty(&self, user_id: &str) -> Result<usize, AgentError>;
}

pub fn create_conversation_store(args: &Args) -> Result<Arc<dyn ConversationStore>, AgentError> {
    info!("Conversations will be stored in: {}", args.store_type);
    match args.store_type.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(MemoryConversationStore::new())),
        "redis" => Ok(Arc::new(RedisConversationStore::new(args)?)),
        other =>
            Err(AgentError::Config(format!("Unsupported conversation store type: {}", other))),
    }
}
