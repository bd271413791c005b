pub mod api;

use std::sync::Arc;

use crate::agent::RagAgent;
use crate::error::AgentError;
use crate::store::ConversationStore;

pub struct Server {
    addr: String,
    agent: Arc<RagAgent>,
    store: Arc<dyn ConversationStore>,
    auth_header: String,
}

impl Server {
    pub fn new(
        addr: String,
        agent: Arc<RagAgent>,
        store: Arc<dyn ConversationStore>,
        auth_header: String
    ) -> Self {
        Self {
            addr,
            agent,
            store,
            auth_header,
        }
    }

    pub async fn run(&self) -> Result<(), AgentError> {
        api::start_http_server(
            &self.addr,
            Arc::clone(&self.agent),
            Arc::clone(&self.store),
            self.auth_header.clone()
        ).await
    }
}
