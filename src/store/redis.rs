use async_trait::async_trait;
use chrono::Utc;
use log::error;
use redis::{ AsyncCommands, Client };
use std::collections::HashMap;
use uuid::Uuid;

use super::ConversationStore;
use crate::cli::Args;
use crate::error::AgentError;
use crate::models::chat::{ ChatMessage, Conversation, Role };

/// Redis-backed store.
///
/// Layout per conversation: a hash `{prefix}conv:{id}` with owner and
/// creation time, and a list `{prefix}msgs:{id}` holding the message log as
/// JSON in append order. A per-user sorted set `{prefix}user:{uid}` indexes
/// conversation ids scored by creation time for newest-first lookups.
pub struct RedisConversationStore {
    client: Client,
    key_prefix: String,
}

impl RedisConversationStore {
    pub fn new(args: &Args) -> Result<Self, AgentError> {
        Ok(Self {
            client: Client::open(args.store_host.as_str())?,
            key_prefix: args.store_redis_prefix.clone(),
        })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, AgentError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    fn conv_key(&self, conversation_id: &str) -> String {
        format!("{}conv:{}", self.key_prefix, conversation_id)
    }

    fn msgs_key(&self, conversation_id: &str) -> String {
        format!("{}msgs:{}", self.key_prefix, conversation_id)
    }

    fn user_key(&self, user_id: &str) -> String {
        format!("{}user:{}", self.key_prefix, user_id)
    }

    async fn read_meta(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        conversation_id: &str
    ) -> Result<Option<Conversation>, AgentError> {
        let fields: HashMap<String, String> = conn.hgetall(self.conv_key(conversation_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        let user_id = fields
            .get("user_id")
            .cloned()
            .ok_or_else(|| AgentError::Store("Conversation record lacks user_id".to_string()))?;
        let created_at = fields
            .get("created_at")
            .and_then(|v| v.parse::<i64>().ok())
            .ok_or_else(|| AgentError::Store("Conversation record lacks created_at".to_string()))?;

        Ok(
            Some(Conversation {
                id: conversation_id.to_string(),
                user_id,
                created_at,
                messages: Vec::new(),
            })
        )
    }

    async fn read_messages(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        conversation_id: &str,
        limit_to_first: bool
    ) -> Result<Vec<ChatMessage>, AgentError> {
        let stop = if limit_to_first { 0 } else { -1 };
        let entries: Vec<String> = conn.lrange(self.msgs_key(conversation_id), 0, stop).await?;

        let mut messages = Vec::with_capacity(entries.len());
        for entry in &entries {
            match serde_json::from_str::<ChatMessage>(entry) {
                Ok(msg) => messages.push(msg),
                Err(e) => error!("Skipping unparseable message entry: {}", e),
            }
        }
        Ok(messages)
    }

    async fn create_conversation(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        user_id: &str
    ) -> Result<Conversation, AgentError> {
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now().timestamp_millis(),
            messages: Vec::new(),
        };

        let _: () = conn.hset_multiple(
            self.conv_key(&conversation.id),
            &[
                ("user_id", conversation.user_id.clone()),
                ("created_at", conversation.created_at.to_string()),
            ]
        ).await?;
        let _: i64 = conn.zadd(
            self.user_key(user_id),
            conversation.id.clone(),
            conversation.created_at
        ).await?;

        Ok(conversation)
    }
}

#[async_trait]
impl ConversationStore for RedisConversationStore {
    async fn find_or_create_active(
        &self,
        user_id: &str,
        force_new: bool
    ) -> Result<Conversation, AgentError> {
        let mut conn = self.get_connection().await?;

        if !force_new {
            let newest: Vec<String> = conn.zrevrange(self.user_key(user_id), 0, 0).await?;
            if let Some(id) = newest.first() {
                if let Some(meta) = self.read_meta(&mut conn, id).await? {
                    return Ok(meta);
                }
            }
        }

        self.create_conversation(&mut conn, user_id).await
    }

    async fn get_conversation(
        &self,
        user_id: &str,
        conversation_id: &str
    ) -> Result<Conversation, AgentError> {
        let mut conn = self.get_connection().await?;

        let mut conversation = self
            .read_meta(&mut conn, conversation_id).await?
            .ok_or(AgentError::NotFound)?;
        if conversation.user_id != user_id {
            return Err(AgentError::NotFound);
        }

        conversation.messages = self.read_messages(&mut conn, conversation_id, false).await?;
        Ok(conversation)
    }

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>, AgentError> {
        let mut conn = self.get_connection().await?;
        let ids: Vec<String> = conn.zrevrange(self.user_key(user_id), 0, -1).await?;

        let mut conversations = Vec::with_capacity(ids.len());
        for id in &ids {
            let Some(mut conversation) = self.read_meta(&mut conn, id).await? else {
                continue;
            };
            conversation.messages = self.read_messages(&mut conn, id, true).await?;
            conversations.push(conversation);
        }
        Ok(conversations)
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str
    ) -> Result<ChatMessage, AgentError> {
        let mut conn = self.get_connection().await?;

        let exists: bool = conn.exists(self.conv_key(conversation_id)).await?;
        if !exists {
            return Err(AgentError::NotFound);
        }

        let message = ChatMessage {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.to_string(),
            created_at: Utc::now().timestamp_millis(),
        };
        let json_msg = serde_json::to_string(&message)?;
        let _: i64 = conn.rpush(self.msgs_key(conversation_id), &json_msg).await?;

        Ok(message)
    }

    async fn delete_empty(&self, user_id: &str) -> Result<usize, AgentError> {
        let mut conn = self.get_connection().await?;
        let ids: Vec<String> = conn.zrevrange(self.user_key(user_id), 0, -1).await?;

        let mut deleted = 0;
        for id in &ids {
            let message_count: i64 = conn.llen(self.msgs_key(id)).await?;
            if message_count == 0 {
                let _: i64 = conn.del(&[self.conv_key(id), self.msgs_key(id)]).await?;
                let _: i64 = conn.zrem(self.user_key(user_id), id).await?;
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}
