pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use futures::{ Stream, StreamExt };
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ LlmConfig, LlmType };
use self::ollama::OllamaChatClient;
use self::openai::OpenAIChatClient;
use crate::error::AgentError;
use crate::models::chat::InboundMessage;

/// Incremental completion output. Finite, not restartable.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<String, AgentError>> + Send>>;

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Open a streaming completion over `[system_prompt, ...history]`.
    ///
    /// Fails with `AgentError::Completion` when the upstream call cannot be
    /// established at all; once a stream is returned, upstream failures
    /// surface as an `Err` item terminating it.
    async fn stream_chat(
        &self,
        system_prompt: &str,
        history: &[InboundMessage],
        temperature: f32
    ) -> Result<CompletionStream, AgentError>;
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, AgentError> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::Ollama => Arc::new(OllamaChatClient::from_config(config)?),
        LlmType::OpenAI => Arc::new(OpenAIChatClient::from_config(config)?),
    };
    Ok(client)
}

/// What one provider response line contributes to the chunk stream.
pub(crate) enum LineEvent {
    Token(String),
    Done,
    Skip,
}

/// Decode `chunk` appended to any carried-over bytes, returning the longest
/// valid UTF-8 prefix. A multi-byte character split across network chunks is
/// carried in `carry` until its continuation bytes arrive; genuinely invalid
/// bytes are dropped rather than terminating the stream.
fn decode_chunk(carry: &mut Vec<u8>, chunk: &[u8]) -> String {
    carry.extend_from_slice(chunk);
    let mut out = String::new();

    loop {
        match std::str::from_utf8(carry) {
            Ok(text) => {
                out.push_str(text);
                carry.clear();
                return out;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                if let Ok(text) = std::str::from_utf8(&carry[..valid]) {
                    out.push_str(text);
                }
                match e.error_len() {
                    // Invalid sequence; skip it and keep decoding.
                    Some(len) => {
                        carry.drain(..valid + len);
                    }
                    // Incomplete trailing character; wait for the next chunk.
                    None => {
                        carry.drain(..valid);
                        return out;
                    }
                }
            }
        }
    }
}

/// Relay a line-oriented provider body (SSE or NDJSON) as a chunk stream.
///
/// The body is read on a spawned task and forwarded through a channel, with
/// partial lines carried across network chunk boundaries. Transport failures
/// mid-body terminate the stream with an `Err` item. Dropping the returned
/// stream drops the task's sender on its next forward, which aborts the
/// upstream read.
pub(crate) fn relay_body_lines(
    resp: reqwest::Response,
    line_parser: fn(&str) -> LineEvent
) -> CompletionStream {
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        let mut bytes = resp.bytes_stream();
        let mut carry = Vec::new();
        let mut pending = String::new();

        'read: while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(buf) => {
                    pending.push_str(&decode_chunk(&mut carry, &buf));

                    while let Some(pos) = pending.find('\n') {
                        let line = pending[..pos].trim_end_matches('\r').to_string();
                        pending.drain(..=pos);

                        match line_parser(&line) {
                            LineEvent::Token(token) => {
                                if tx.send(Ok(token)).await.is_err() {
                                    return;
                                }
                            }
                            LineEvent::Done => {
                                break 'read;
                            }
                            LineEvent::Skip => {}
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(AgentError::Completion(e.to_string()))).await;
                    return;
                }
            }
        }

        let trailing = pending.trim_end();
        if !trailing.is_empty() {
            if let LineEvent::Token(token) = line_parser(trailing) {
                let _ = tx.send(Ok(token)).await;
            }
        }
    });

    Box::pin(ReceiverStream::new(rx))
}
