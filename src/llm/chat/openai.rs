use async_trait::async_trait;
use log::info;
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };

use super::{ relay_body_lines, ChatClient, CompletionStream, LineEvent };
use crate::error::AgentError;
use crate::llm::LlmConfig;
use crate::models::chat::InboundMessage;

pub struct OpenAIChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
}

#[derive(Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAIStreamResponse {
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
}

impl OpenAIChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>
    ) -> Result<Self, AgentError> {
        let chat_model = model.unwrap_or_else(|| "gpt-4".to_string());
        let api_url = base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e|
                AgentError::Config(format!("Invalid API key format: {}", e))
            )?
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| AgentError::Config(e.to_string()))?;

        Ok(Self {
            http,
            model: chat_model,
            base_url: api_url,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, AgentError> {
        let api_key = config.api_key
            .clone()
            .ok_or_else(|| AgentError::Config("OpenAI API key is required".to_string()))?;
        Self::new(api_key, config.completion_model.clone(), config.base_url.clone())
    }
}

fn parse_sse_line(line: &str) -> LineEvent {
    if line.is_empty() {
        return LineEvent::Skip;
    }
    if line == "data: [DONE]" {
        return LineEvent::Done;
    }

    let Some(data) = line.strip_prefix("data: ") else {
        return LineEvent::Skip;
    };

    match serde_json::from_str::<OpenAIStreamResponse>(data) {
        Ok(stream_resp) => {
            for choice in stream_resp.choices {
                if let Some(content) = choice.delta.content {
                    if !content.is_empty() {
                        return LineEvent::Token(content);
                    }
                }
                if choice.finish_reason.as_deref() == Some("stop") {
                    return LineEvent::Done;
                }
            }
            LineEvent::Skip
        }
        Err(e) => {
            info!("OpenAI stream: JSON parse error: {} for data: {}", e, data);
            LineEvent::Skip
        }
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn stream_chat(
        &self,
        system_prompt: &str,
        history: &[InboundMessage],
        temperature: f32
    ) -> Result<CompletionStream, AgentError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(OpenAIMessage {
            role: "system".to_string(),
            content: system_prompt.to_string(),
        });
        for msg in history {
            messages.push(OpenAIMessage {
                role: msg.role.to_string(),
                content: msg.content.clone(),
            });
        }

        let req = OpenAIChatRequest {
            model: self.model.clone(),
            messages,
            temperature,
            stream: true,
        };

        let resp = self.http
            .post(&url)
            .json(&req)
            .send().await
            .map_err(|e| AgentError::Completion(format!("OpenAI request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| AgentError::Completion(format!("OpenAI returned an error: {}", e)))?;

        Ok(relay_body_lines(resp, parse_sse_line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_line_with_content_yields_token() {
        let line = r#"data: {"choices":[{"delta":{"content":"Austin"},"finish_reason":null}]}"#;
        match parse_sse_line(line) {
            LineEvent::Token(token) => assert_eq!(token, "Austin"),
            _ => panic!("expected a token"),
        }
    }

    #[test]
    fn done_marker_terminates() {
        assert!(matches!(parse_sse_line("data: [DONE]"), LineEvent::Done));
        let line = r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert!(matches!(parse_sse_line(line), LineEvent::Done));
    }

    #[test]
    fn noise_lines_are_skipped() {
        assert!(matches!(parse_sse_line(""), LineEvent::Skip));
        assert!(matches!(parse_sse_line(": keep-alive"), LineEvent::Skip));
        assert!(matches!(parse_sse_line("data: not json"), LineEvent::Skip));
    }
}
