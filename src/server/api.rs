use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ Path, State },
    http::{ header::CONTENT_TYPE, HeaderMap, StatusCode },
    response::{ IntoResponse, Response },
    routing::{ get, post },
    Json,
    Router,
};
use log::{ error, info };
use serde_json::json;
use tower_http::cors::{ Any, CorsLayer };

use crate::agent::RagAgent;
use crate::error::AgentError;
use crate::models::chat::{ ChatRequest, CreateChatRequest };
use crate::store::ConversationStore;

#[derive(Clone)]
struct AppState {
    agent: Arc<RagAgent>,
    store: Arc<dyn ConversationStore>,
    auth_header: String,
}

impl AgentError {
    fn status_code(&self) -> StatusCode {
        match self {
            AgentError::Unauthorized => StatusCode::UNAUTHORIZED,
            AgentError::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        if self.status_code() == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", self);
        }
        (self.status_code(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub async fn start_http_server(
    addr: &str,
    agent: Arc<RagAgent>,
    store: Arc<dyn ConversationStore>,
    auth_header: String
) -> Result<(), AgentError> {
    let addr = addr
        .parse::<SocketAddr>()
        .map_err(|e| AgentError::Config(format!("Invalid server address: {}", e)))?;
    info!("Starting HTTP API server on: http://{}", addr);

    let app_state = AppState {
        agent,
        store,
        auth_header,
    };

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let app = Router::new()
        .route("/chat", post(chat_handler))
        .route(
            "/api/chats",
            get(list_chats_handler).post(create_chat_handler).delete(delete_empty_chats_handler)
        )
        .route("/api/chats/{id}", get(get_chat_handler))
        .layer(cors)
        .with_state(app_state);

    let listener = tokio::net::TcpListener
        ::bind(addr).await
        .map_err(|e| AgentError::Config(format!("Failed to bind to {}: {}", addr, e)))?;
    axum
        ::serve(listener, app.into_make_service()).await
        .map_err(|e| AgentError::Config(format!("HTTP server error: {}", e)))
}

/// Identity is resolved by the auth tier upstream of this service; here it
/// arrives as a trusted request header.
fn resolve_identity(state: &AppState, headers: &HeaderMap) -> Result<String, AgentError> {
    headers
        .get(state.auth_header.as_str())
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or(AgentError::Unauthorized)
}

async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>
) -> Response {
    let user_id = match resolve_identity(&state, &headers) {
        Ok(uid) => uid,
        Err(e) => {
            return e.into_response();
        }
    };

    match state.agent.chat_turn(&user_id, request).await {
        Ok(stream) =>
            (
                [(CONTENT_TYPE, "text/plain; charset=utf-8")],
                Body::from_stream(stream),
            ).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn list_chats_handler(
    State(state): State<AppState>,
    headers: HeaderMap
) -> Result<Response, AgentError> {
    let user_id = resolve_identity(&state, &headers)?;
    let conversations = state.store.list_conversations(&user_id).await?;
    Ok(Json(conversations).into_response())
}

async fn create_chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateChatRequest>
) -> Result<Response, AgentError> {
    let user_id = resolve_identity(&state, &headers)?;
    let conversation = state.store.find_or_create_active(&user_id, request.force_new).await?;
    Ok(Json(conversation).into_response())
}

async fn delete_empty_chats_handler(
    State(state): State<AppState>,
    headers: HeaderMap
) -> Result<Response, AgentError> {
    let user_id = resolve_identity(&state, &headers)?;
    let deleted = state.store.delete_empty(&user_id).await?;
    Ok(Json(json!({ "deletedCount": deleted })).into_response())
}

async fn get_chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>
) -> Result<Response, AgentError> {
    let user_id = resolve_identity(&state, &headers)?;
    let conversation = state.store.get_conversation(&user_id, &id).await?;
    Ok(Json(conversation).into_response())
}
