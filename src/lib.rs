pub mod agent;
pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod rag;
pub mod server;
pub mod store;

use std::sync::Arc;

use agent::RagAgent;
use cli::Args;
use error::AgentError;
use llm::{ parse_llm_type, LlmConfig };
use log::info;
use rag::QdrantIndex;
use server::Server;

pub async fn run(args: Args) -> Result<(), AgentError> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Conversation Store Type: {}", args.store_type);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Embedding LLM Type: {}", args.embedding_llm_type);
    info!("Vector Index Host: {}", args.vector_host);
    info!("Vector Index Name: {}", args.vector_index_name);
    info!("Retrieval Top-K: {}", args.rag_top_k);
    info!("Chat Temperature: {}", args.chat_temperature);
    info!("Identity Header: {}", args.auth_header);
    info!("-------------------------");

    let store = store::create_conversation_store(&args)?;

    let chat_config = LlmConfig {
        llm_type: parse_llm_type(&args.chat_llm_type)?,
        base_url: args.chat_base_url.clone(),
        api_key: Some(args.chat_api_key.clone()).filter(|k| !k.is_empty()),
        completion_model: args.chat_model.clone(),
        embedding_model: None,
    };
    let chat_client = llm::chat::new_client(&chat_config)?;

    let embedding_config = LlmConfig {
        llm_type: parse_llm_type(&args.embedding_llm_type)?,
        base_url: args.embedding_base_url.clone(),
        api_key: Some(args.embedding_api_key.clone()).filter(|k| !k.is_empty()),
        completion_model: None,
        embedding_model: args.embedding_model.clone(),
    };
    let embedding_client = llm::embedding::new_client(&embedding_config)?;

    let vector_index = Arc::new(
        QdrantIndex::new(
            &args.vector_host,
            args.vector_api_key.clone(),
            args.vector_index_name.clone()
        )?
    );

    let prompts = config::prompt::load_prompts(args.prompts_path.as_deref())?;

    let agent = Arc::new(
        RagAgent::new(
            Arc::clone(&store),
            chat_client,
            embedding_client,
            vector_index,
            prompts,
            args.rag_top_k,
            args.chat_temperature
        )
    );

    let server = Server::new(args.server_addr.clone(), agent, store, args.auth_header.clone());
    server.run().await
}
