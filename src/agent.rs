use futures::StreamExt;
use log::{ error, info, warn };
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::classify::{ classify, QueryClass };
use crate::config::prompt::{ compose_system_prompt, PromptConfig };
use crate::error::AgentError;
use crate::llm::chat::{ ChatClient, CompletionStream };
use crate::llm::embedding::EmbeddingClient;
use crate::models::chat::{ ChatRequest, Role };
use crate::rag::{ Fragment, VectorIndex };
use crate::store::ConversationStore;

/// Top-level coordinator for one chat turn: resolve the conversation, persist
/// the user message, classify, optionally retrieve grounding, compose the
/// system prompt, and stream the completion while recording it on success.
///
/// Collaborators are injected once at construction and shared across
/// requests; the agent itself holds no per-turn state.
pub struct RagAgent {
    store: Arc<dyn ConversationStore>,
    chat_client: Arc<dyn ChatClient>,
    embedding_client: Arc<dyn EmbeddingClient>,
    vector_index: Arc<dyn VectorIndex>,
    prompts: Arc<PromptConfig>,
    top_k: usize,
    temperature: f32,
}

impl RagAgent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn ConversationStore>,
        chat_client: Arc<dyn ChatClient>,
        embedding_client: Arc<dyn EmbeddingClient>,
        vector_index: Arc<dyn VectorIndex>,
        prompts: Arc<PromptConfig>,
        top_k: usize,
        temperature: f32
    ) -> Self {
        Self {
            store,
            chat_client,
            embedding_client,
            vector_index,
            prompts,
            top_k,
            temperature,
        }
    }

    /// Run one turn. Returns the chunk stream for the caller; the assistant
    /// message is persisted in the background once the stream completes
    /// cleanly. Errors returned here occurred before any output was streamed.
    pub async fn chat_turn(
        &self,
        user_id: &str,
        request: ChatRequest
    ) -> Result<CompletionStream, AgentError> {
        let conversation = match &request.chat_id {
            Some(id) => self.store.get_conversation(user_id, id).await?,
            None => self.store.find_or_create_active(user_id, false).await?,
        };

        let query = request.messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        // No point calling the model with un-recorded context, so a failed
        // user-message write ends the turn.
        self.store.append_message(&conversation.id, Role::User, &query).await?;

        let class = classify(&query);
        info!("Turn on conversation {}: classified as {:?}", conversation.id, class);

        let fragments = match class {
            QueryClass::General => Vec::new(),
            QueryClass::Specific => self.retrieve_fragments(&query).await,
        };

        let system_prompt = compose_system_prompt(&self.prompts, class, &fragments);

        let upstream = self.chat_client.stream_chat(
            &system_prompt,
            &request.messages,
            self.temperature
        ).await?;

        Ok(self.relay_and_persist(conversation.id, upstream))
    }

    /// Grounding is best-effort: any embedding or index failure degrades the
    /// turn to the no-grounding prompt path instead of aborting it.
    async fn retrieve_fragments(&self, query: &str) -> Vec<Fragment> {
        let embedding = match self.embedding_client.embed(query).await {
            Ok(resp) => resp.embedding,
            Err(e) => {
                warn!("Embedding failed, answering without grounding: {}", e);
                return Vec::new();
            }
        };

        match self.vector_index.query_top_k(&embedding, self.top_k).await {
            Ok(fragments) => {
                info!("Retrieved {} fragment(s)", fragments.len());
                fragments
            }
            Err(e) => {
                warn!("Retrieval failed, answering without grounding: {}", e);
                Vec::new()
            }
        }
    }

    /// Forward chunks to the caller in arrival order while accumulating the
    /// full text. The assistant message is persisted exactly once, after a
    /// clean upstream end; a mid-stream failure or caller disconnect skips
    /// persistence so no truncated output is ever recorded.
    fn relay_and_persist(
        &self,
        conversation_id: String,
        mut upstream: CompletionStream
    ) -> CompletionStream {
        let store = Arc::clone(&self.store);
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut full_response = String::new();

            while let Some(chunk) = upstream.next().await {
                match chunk {
                    Ok(token) => {
                        full_response.push_str(&token);
                        if tx.send(Ok(token)).await.is_err() {
                            // Caller went away; abort upstream, persist nothing.
                            return;
                        }
                    }
                    Err(e) => {
                        error!("Completion stream failed mid-turn: {}", e);
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }

            if
                let Err(e) = store.append_message(
                    &conversation_id,
                    Role::Assistant,
                    &full_response
                ).await
            {
                // The caller already has the answer; surface the durability
                // gap for operators instead of retracting the response.
                error!(
                    "Failed to persist assistant message for conversation {}: {}",
                    conversation_id,
                    e
                );
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{ AtomicUsize, Ordering };
    use std::sync::Mutex;

    use crate::llm::embedding::EmbeddingResponse;
    use crate::models::chat::InboundMessage;
    use crate::store::MemoryConversationStore;

    struct MockChatClient {
        chunks: Vec<Result<String, String>>,
        fail_to_establish: bool,
        calls: AtomicUsize,
        seen_system_prompt: Mutex<Option<String>>,
    }

    impl MockChatClient {
        fn streaming(chunks: &[&str]) -> Self {
            Self {
                chunks: chunks
                    .iter()
                    .map(|c| Ok(c.to_string()))
                    .collect(),
                fail_to_establish: false,
                calls: AtomicUsize::new(0),
                seen_system_prompt: Mutex::new(None),
            }
        }

        fn failing_mid_stream(chunks: &[&str]) -> Self {
            let mut items: Vec<Result<String, String>> = chunks
                .iter()
                .map(|c| Ok(c.to_string()))
                .collect();
            items.push(Err("upstream reset".to_string()));
            Self {
                chunks: items,
                fail_to_establish: false,
                calls: AtomicUsize::new(0),
                seen_system_prompt: Mutex::new(None),
            }
        }

        fn unreachable_upstream() -> Self {
            Self {
                chunks: Vec::new(),
                fail_to_establish: true,
                calls: AtomicUsize::new(0),
                seen_system_prompt: Mutex::new(None),
            }
        }

        fn system_prompt(&self) -> String {
            self.seen_system_prompt.lock().unwrap().clone().expect("no chat call recorded")
        }
    }

    #[async_trait]
    impl ChatClient for MockChatClient {
        async fn stream_chat(
            &self,
            system_prompt: &str,
            _history: &[InboundMessage],
            _temperature: f32
        ) -> Result<CompletionStream, AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_system_prompt.lock().unwrap() = Some(system_prompt.to_string());

            if self.fail_to_establish {
                return Err(AgentError::Completion("connection refused".to_string()));
            }

            let items: Vec<Result<String, AgentError>> = self.chunks
                .iter()
                .map(|c| {
                    match c {
                        Ok(token) => Ok(token.clone()),
                        Err(e) => Err(AgentError::Completion(e.clone())),
                    }
                })
                .collect();
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    struct MockEmbeddingClient {
        calls: AtomicUsize,
        fail: bool,
    }

    impl MockEmbeddingClient {
        fn working() -> Self {
            Self { calls: AtomicUsize::new(0), fail: false }
        }

        fn failing() -> Self {
            Self { calls: AtomicUsize::new(0), fail: true }
        }
    }

    #[async_trait]
    impl EmbeddingClient for MockEmbeddingClient {
        async fn embed(&self, _text: &str) -> Result<EmbeddingResponse, AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AgentError::Embedding("quota exceeded".to_string()));
            }
            Ok(EmbeddingResponse { embedding: vec![0.1, 0.2, 0.3] })
        }
    }

    struct MockIndex {
        calls: AtomicUsize,
        fragments: Vec<Fragment>,
        fail: bool,
    }

    impl MockIndex {
        fn returning(texts: &[&str]) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fragments: texts
                    .iter()
                    .enumerate()
                    .map(|(i, t)| Fragment {
                        text: t.to_string(),
                        score: 0.9 - (i as f32) * 0.1,
                    })
                    .collect(),
                fail: false,
            }
        }

        fn empty() -> Self {
            Self::returning(&[])
        }

        fn failing() -> Self {
            Self { calls: AtomicUsize::new(0), fragments: Vec::new(), fail: true }
        }
    }

    #[async_trait]
    impl VectorIndex for MockIndex {
        async fn query_top_k(
            &self,
            _vector: &[f32],
            _k: usize
        ) -> Result<Vec<Fragment>, AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AgentError::Retrieval("index unreachable".to_string()));
            }
            Ok(self.fragments.clone())
        }
    }

    struct Fixture {
        agent: RagAgent,
        store: Arc<MemoryConversationStore>,
        chat: Arc<MockChatClient>,
        embedding: Arc<MockEmbeddingClient>,
        index: Arc<MockIndex>,
    }

    fn fixture(chat: MockChatClient, embedding: MockEmbeddingClient, index: MockIndex) -> Fixture {
        let store = Arc::new(MemoryConversationStore::new());
        let chat = Arc::new(chat);
        let embedding = Arc::new(embedding);
        let index = Arc::new(index);
        let agent = RagAgent::new(
            Arc::clone(&store) as Arc<dyn ConversationStore>,
            Arc::clone(&chat) as Arc<dyn ChatClient>,
            Arc::clone(&embedding) as Arc<dyn EmbeddingClient>,
            Arc::clone(&index) as Arc<dyn VectorIndex>,
            Arc::new(PromptConfig::default()),
            5,
            0.7
        );
        Fixture { agent, store, chat, embedding, index }
    }

    fn request(content: &str) -> ChatRequest {
        ChatRequest {
            messages: vec![InboundMessage {
                role: Role::User,
                content: content.to_string(),
            }],
            chat_id: None,
        }
    }

    async fn collect(mut stream: CompletionStream) -> (String, Option<AgentError>) {
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(token) => text.push_str(&token),
                Err(e) => {
                    return (text, Some(e));
                }
            }
        }
        (text, None)
    }

    #[tokio::test]
    async fn greeting_skips_retrieval_entirely() {
        let f = fixture(
            MockChatClient::streaming(&["Hey", " there!"]),
            MockEmbeddingClient::working(),
            MockIndex::returning(&["should never be used"])
        );

        let stream = f.agent.chat_turn("user-1", request("hello")).await.unwrap();
        let (text, err) = collect(stream).await;

        assert!(err.is_none());
        assert_eq!(text, "Hey there!");
        assert_eq!(f.embedding.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.index.calls.load(Ordering::SeqCst), 0);
        assert!(!f.chat.system_prompt().contains("relevant information to consider"));
    }

    #[tokio::test]
    async fn specific_query_grounds_prompt_and_persists_answer() {
        let f = fixture(
            MockChatClient::streaming(&["Around ", "$95k to $120k."]),
            MockEmbeddingClient::working(),
            MockIndex::returning(
                &[
                    "Backend devs in Austin earn $95k-$120k.",
                    "Demand is high in Austin's tech corridor.",
                ]
            )
        );

        let stream = f.agent
            .chat_turn(
                "user-1",
                request("What is the average salary for a backend developer in Austin?")
            ).await
            .unwrap();
        let (text, err) = collect(stream).await;

        assert!(err.is_none());
        assert_eq!(text, "Around $95k to $120k.");
        assert_eq!(f.embedding.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.index.calls.load(Ordering::SeqCst), 1);
        assert!(
            f.chat
                .system_prompt()
                .contains(
                    "Backend devs in Austin earn $95k-$120k. Demand is high in Austin's tech corridor."
                )
        );

        let conversations = f.store.list_conversations("user-1").await.unwrap();
        assert_eq!(conversations.len(), 1);
        let conversation = f.store
            .get_conversation("user-1", &conversations[0].id).await
            .unwrap();
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[0].role, Role::User);
        assert_eq!(conversation.messages[1].role, Role::Assistant);
        assert_eq!(conversation.messages[1].content, "Around $95k to $120k.");
    }

    #[tokio::test]
    async fn retrieval_failure_degrades_to_no_info_prompt() {
        let f = fixture(
            MockChatClient::streaming(&["Could you rephrase?"]),
            MockEmbeddingClient::working(),
            MockIndex::failing()
        );

        let result = f.agent.chat_turn("user-1", request("salary trends for devops?")).await;
        let stream = result.expect("retrieval failure must not fail the turn");
        let (text, err) = collect(stream).await;

        assert!(err.is_none());
        assert_eq!(text, "Could you rephrase?");
        let prompt = f.chat.system_prompt();
        assert!(!prompt.contains("relevant information to consider"));
        assert!(PromptConfig::default().no_info_templates.contains(&prompt));
    }

    #[tokio::test]
    async fn embedding_failure_degrades_the_same_way() {
        let f = fixture(
            MockChatClient::streaming(&["Happy to help anyway."]),
            MockEmbeddingClient::failing(),
            MockIndex::returning(&["never reached"])
        );

        let stream = f.agent
            .chat_turn("user-1", request("median pay for SRE roles?")).await
            .unwrap();
        let (_, err) = collect(stream).await;

        assert!(err.is_none());
        assert_eq!(f.index.calls.load(Ordering::SeqCst), 0);
        assert!(!f.chat.system_prompt().contains("relevant information to consider"));
    }

    #[tokio::test]
    async fn empty_retrieval_result_uses_fallback_not_grounding() {
        let f = fixture(
            MockChatClient::streaming(&["ok"]),
            MockEmbeddingClient::working(),
            MockIndex::empty()
        );

        let stream = f.agent
            .chat_turn("user-1", request("openings for Haskell developers in Reykjavik?")).await
            .unwrap();
        collect(stream).await;

        assert_eq!(f.index.calls.load(Ordering::SeqCst), 1);
        let prompt = f.chat.system_prompt();
        assert!(PromptConfig::default().no_info_templates.contains(&prompt));
    }

    #[tokio::test]
    async fn mid_stream_failure_skips_assistant_persistence() {
        let f = fixture(
            MockChatClient::failing_mid_stream(&["partial ", "answer"]),
            MockEmbeddingClient::working(),
            MockIndex::empty()
        );

        let stream = f.agent.chat_turn("user-1", request("hello")).await.unwrap();
        let (text, err) = collect(stream).await;

        assert_eq!(text, "partial answer");
        assert!(matches!(err, Some(AgentError::Completion(_))));

        let conversations = f.store.list_conversations("user-1").await.unwrap();
        let conversation = f.store
            .get_conversation("user-1", &conversations[0].id).await
            .unwrap();
        assert_eq!(conversation.messages.len(), 1);
        assert_eq!(conversation.messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn caller_disconnect_skips_assistant_persistence() {
        // More chunks than the relay channel buffers, so the relay task is
        // still forwarding when the caller goes away.
        let chunks: Vec<String> = (0..64).map(|i| format!("chunk {} ", i)).collect();
        let chunk_refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
        let f = fixture(
            MockChatClient::streaming(&chunk_refs),
            MockEmbeddingClient::working(),
            MockIndex::empty()
        );

        let mut stream = f.agent.chat_turn("user-1", request("hello")).await.unwrap();
        let first = stream.next().await;
        assert!(matches!(first, Some(Ok(_))));
        drop(stream);

        // Give the relay task time to observe the closed channel and exit.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let conversations = f.store.list_conversations("user-1").await.unwrap();
        let conversation = f.store
            .get_conversation("user-1", &conversations[0].id).await
            .unwrap();
        assert_eq!(conversation.messages.len(), 1);
        assert_eq!(conversation.messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn unreachable_upstream_is_a_synchronous_error() {
        let f = fixture(
            MockChatClient::unreachable_upstream(),
            MockEmbeddingClient::working(),
            MockIndex::empty()
        );

        let result = f.agent.chat_turn("user-1", request("hello")).await;
        assert!(matches!(result, Err(AgentError::Completion(_))));
    }

    #[tokio::test]
    async fn unknown_chat_id_is_not_found_before_any_model_call() {
        let f = fixture(
            MockChatClient::streaming(&["never"]),
            MockEmbeddingClient::working(),
            MockIndex::empty()
        );

        let mut req = request("hello");
        req.chat_id = Some("no-such-conversation".to_string());
        let result = f.agent.chat_turn("user-1", req).await;

        assert!(matches!(result, Err(AgentError::NotFound)));
        assert_eq!(f.chat.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn explicit_chat_id_of_another_user_is_not_found() {
        let f = fixture(
            MockChatClient::streaming(&["never"]),
            MockEmbeddingClient::working(),
            MockIndex::empty()
        );

        let other = f.store.find_or_create_active("user-2", true).await.unwrap();
        let mut req = request("hello");
        req.chat_id = Some(other.id.clone());
        let result = f.agent.chat_turn("user-1", req).await;

        assert!(matches!(result, Err(AgentError::NotFound)));
    }

    #[tokio::test]
    async fn empty_message_list_still_completes_as_general() {
        let f = fixture(
            MockChatClient::streaming(&["Hi!"]),
            MockEmbeddingClient::working(),
            MockIndex::returning(&["unused"])
        );

        let req = ChatRequest { messages: Vec::new(), chat_id: None };
        let stream = f.agent.chat_turn("user-1", req).await.unwrap();
        let (text, err) = collect(stream).await;

        assert!(err.is_none());
        assert_eq!(text, "Hi!");
        assert_eq!(f.index.calls.load(Ordering::SeqCst), 0);
    }
}
