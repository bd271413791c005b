use serde::{ Serialize, Deserialize };
use std::fmt;

/// Message author. Serialized lowercase on the wire and in the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

/// A persisted message. `created_at` is epoch milliseconds; messages within a
/// conversation are ordered by it, ties broken by insertion order.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub created_at: i64,
}

/// A conversation owned by exactly one user. `messages` carries the full
/// ordered log on detail fetches and at most the first message on list
/// (preview) fetches.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub created_at: i64,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// One entry of the inbound `POST /chat` history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InboundMessage {
    pub role: Role,
    pub content: String,
}

/// Body of `POST /chat`.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<InboundMessage>,
    #[serde(rename = "chatId")]
    pub chat_id: Option<String>,
}

/// Body of `POST /api/chats`.
#[derive(Debug, Default, Deserialize)]
pub struct CreateChatRequest {
    #[serde(rename = "forceNew", default)]
    pub force_new: bool,
}
