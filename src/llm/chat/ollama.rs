use async_trait::async_trait;
use log::info;
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };

use super::{ relay_body_lines, ChatClient, CompletionStream, LineEvent };
use crate::error::AgentError;
use crate::llm::LlmConfig;
use crate::models::chat::InboundMessage;

pub struct OllamaChatClient {
    http: HttpClient,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    options: OllamaOptions,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaStreamResponse {
    message: Option<OllamaStreamMessage>,
    done: bool,
}

#[derive(Deserialize)]
struct OllamaStreamMessage {
    content: String,
}

impl OllamaChatClient {
    pub fn new(base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            http: HttpClient::new(),
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".to_string()),
            model: model.unwrap_or_else(|| "llama3".to_string()),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, AgentError> {
        Ok(Self::new(config.base_url.clone(), config.completion_model.clone()))
    }
}

fn parse_ndjson_line(line: &str) -> LineEvent {
    if line.is_empty() {
        return LineEvent::Skip;
    }

    match serde_json::from_str::<OllamaStreamResponse>(line) {
        Ok(stream_resp) => {
            if let Some(message) = stream_resp.message {
                if !message.content.is_empty() {
                    return LineEvent::Token(message.content);
                }
            }
            if stream_resp.done {
                LineEvent::Done
            } else {
                LineEvent::Skip
            }
        }
        Err(e) => {
            info!("Ollama stream: JSON parse error: {} for line: {}", e, line);
            LineEvent::Skip
        }
    }
}

#[async_trait]
impl ChatClient for OllamaChatClient {
    async fn stream_chat(
        &self,
        system_prompt: &str,
        history: &[InboundMessage],
        temperature: f32
    ) -> Result<CompletionStream, AgentError> {
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(OllamaMessage {
            role: "system".to_string(),
            content: system_prompt.to_string(),
        });
        for msg in history {
            messages.push(OllamaMessage {
                role: msg.role.to_string(),
                content: msg.content.clone(),
            });
        }

        let req = OllamaChatRequest {
            model: self.model.clone(),
            messages,
            options: OllamaOptions { temperature },
            stream: true,
        };

        let resp = self.http
            .post(&url)
            .json(&req)
            .send().await
            .map_err(|e| AgentError::Completion(format!("Ollama request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| AgentError::Completion(format!("Ollama returned an error: {}", e)))?;

        Ok(relay_body_lines(resp, parse_ndjson_line))
    }
}
