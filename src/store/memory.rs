use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{ AtomicU64, Ordering };
use tokio::sync::RwLock;
use uuid::Uuid;

use super::ConversationStore;
use crate::error::AgentError;
use crate::models::chat::{ ChatMessage, Conversation, Role };

struct StoredConversation {
    conversation: Conversation,
    // Creation order, to break ties between same-millisecond conversations.
    seq: u64,
}

/// In-process store. Backs local runs without external services and all of
/// the crate's tests.
#[derive(Default)]
pub struct MemoryConversationStore {
    inner: RwLock<HashMap<String, StoredConversation>>,
    seq: AtomicU64,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn meta(stored: &StoredConversation) -> Conversation {
        Conversation {
            messages: Vec::new(),
            ..stored.conversation.clone()
        }
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn find_or_create_active(
        &self,
        user_id: &str,
        force_new: bool
    ) -> Result<Conversation, AgentError> {
        let mut inner = self.inner.write().await;

        if !force_new {
            let newest = inner
                .values()
                .filter(|stored| stored.conversation.user_id == user_id)
                .max_by_key(|stored| (stored.conversation.created_at, stored.seq));
            if let Some(stored) = newest {
                return Ok(Self::meta(stored));
            }
        }

        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now().timestamp_millis(),
            messages: Vec::new(),
        };
        inner.insert(conversation.id.clone(), StoredConversation {
            conversation: conversation.clone(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        });

        Ok(conversation)
    }

    async fn get_conversation(
        &self,
        user_id: &str,
        conversation_id: &str
    ) -> Result<Conversation, AgentError> {
        let inner = self.inner.read().await;
        match inner.get(conversation_id) {
            Some(stored) if stored.conversation.user_id == user_id => {
                Ok(stored.conversation.clone())
            }
            _ => Err(AgentError::NotFound),
        }
    }

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>, AgentError> {
        let inner = self.inner.read().await;
        let mut owned: Vec<&StoredConversation> = inner
            .values()
            .filter(|stored| stored.conversation.user_id == user_id)
            .collect();
        owned.sort_by_key(|stored| std::cmp::Reverse((stored.conversation.created_at, stored.seq)));

        Ok(
            owned
                .into_iter()
                .map(|stored| {
                    let mut preview = Self::meta(stored);
                    if let Some(first) = stored.conversation.messages.first() {
                        preview.messages.push(first.clone());
                    }
                    preview
                })
                .collect()
        )
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str
    ) -> Result<ChatMessage, AgentError> {
        let mut inner = self.inner.write().await;
        let stored = inner.get_mut(conversation_id).ok_or(AgentError::NotFound)?;

        let message = ChatMessage {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.to_string(),
            created_at: Utc::now().timestamp_millis(),
        };
        stored.conversation.messages.push(message.clone());

        Ok(message)
    }

    async fn delete_empty(&self, user_id: &str) -> Result<usize, AgentError> {
        let mut inner = self.inner.write().await;
        let before = inner.len();
        inner.retain(|_, stored| {
            stored.conversation.user_id != user_id || !stored.conversation.messages.is_empty()
        });
        Ok(before - inner.len())
    }
}
