use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::completion::{CompletionModel, CompletionRequest, TokenStream};
use crate::config::EchoConfig;
use crate::error::{EchoError, Result};
use crate::logging;

pub const GROQ_API_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ErrorDetails,
}

#[derive(Debug, Deserialize)]
struct ErrorDetails {
    message: String,
}

/// Client for Groq's OpenAI-compatible chat completions API
pub struct GroqClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl GroqClient {
    pub fn new(api_key: Option<String>, base_url: &str, model: &str) -> Result<Self> {
        // No overall timeout: replies stream for as long as the caller keeps reading
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn from_config(config: &EchoConfig) -> Result<Self> {
        Self::new(config.groq_api_key.clone(), &config.provider_url, &config.model)
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl CompletionModel for GroqClient {
    async fn stream_completion(&self, request: CompletionRequest) -> Result<TokenStream> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(EchoError::MissingCredentials("GROQ_API_KEY"))?;

        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(ChatMessage {
            role: "system",
            content: &request.system_prompt,
        });
        messages.extend(request.messages.iter().map(|m| ChatMessage {
            role: m.role.as_str(),
            content: &m.content,
        }));

        let body = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            let message = match serde_json::from_str::<ApiError>(&error_text) {
                Ok(parsed) => parsed.error.message,
                Err(_) => error_text,
            };
            logging::log_provider(None, &format!("Groq API error ({}): {}", status, message));

            return Err(EchoError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        Ok(Box::pin(sse_deltas(response.bytes_stream())))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, PartialEq)]
enum SseLine {
    Delta(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> Result<SseLine> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        // comments, event names, ids, blank separators
        return Ok(SseLine::Skip);
    };
    let data = data.trim_start();

    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    if let Ok(api_error) = serde_json::from_str::<ApiError>(data) {
        return Err(EchoError::Stream(api_error.error.message));
    }

    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| EchoError::Stream(format!("bad completion chunk: {}", e)))?;

    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.and_then(|d| d.content))
        .collect();

    if text.is_empty() {
        Ok(SseLine::Skip)
    } else {
        Ok(SseLine::Delta(text))
    }
}

/// Turn an OpenAI-style SSE byte stream into text deltas.
///
/// Lines are split on raw bytes so multi-byte characters cut across network
/// chunks decode intact.
pub fn sse_deltas<S, E>(bytes: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Into<EchoError> + Send + 'static,
{
    async_stream::stream! {
        let mut bytes = Box::pin(bytes);
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = bytes.next().await {
            let chunk: Bytes = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(Into::<EchoError>::into(e));
                    return;
                }
            };
            buffer.extend_from_slice(&chunk);

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                match parse_sse_line(&String::from_utf8_lossy(&line)) {
                    Ok(SseLine::Delta(text)) => yield Ok(text),
                    Ok(SseLine::Done) => return,
                    Ok(SseLine::Skip) => {}
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }

        if !buffer.is_empty() {
            match parse_sse_line(&String::from_utf8_lossy(&buffer)) {
                Ok(SseLine::Delta(text)) => yield Ok(text),
                Ok(_) => {}
                Err(e) => yield Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn byte_stream(parts: Vec<Vec<u8>>) -> impl Stream<Item = std::result::Result<Bytes, EchoError>> {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from(p))))
    }

    async fn collect(parts: Vec<Vec<u8>>) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let mut deltas = Box::pin(sse_deltas(byte_stream(parts)));
        while let Some(delta) = deltas.next().await {
            out.push(delta?);
        }
        Ok(out)
    }

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(parse_sse_line("").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), SseLine::Done);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"你好"}}]}"#).unwrap(),
            SseLine::Delta("你好".to_string())
        );
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            SseLine::Skip
        );
    }

    #[test]
    fn test_parse_sse_error_payload() {
        let err = parse_sse_line(r#"data: {"error":{"message":"rate limited"}}"#).unwrap_err();
        assert!(matches!(err, EchoError::Stream(msg) if msg == "rate limited"));
    }

    #[tokio::test]
    async fn test_deltas_across_chunk_boundaries() {
        let full = "data: {\"choices\":[{\"delta\":{\"content\":\"我听到了\"}}]}\n\n";
        let bytes = full.as_bytes();
        // split in the middle of a multi-byte character
        let split = full.find("听").unwrap() + 1;
        let (head, tail) = bytes.split_at(split);

        let deltas = collect(vec![head.to_vec(), tail.to_vec(), b"data: [DONE]\n\n".to_vec()])
            .await
            .unwrap();
        assert_eq!(deltas, vec!["我听到了".to_string()]);
    }

    #[tokio::test]
    async fn test_stops_at_done() {
        let deltas = collect(vec![
            b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n".to_vec(),
            b"data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\ndata: [DONE]\n\n".to_vec(),
            b"data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n".to_vec(),
        ])
        .await
        .unwrap();
        assert_eq!(deltas, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_bad_chunk_is_stream_error() {
        let result = collect(vec![b"data: {not json}\n\n".to_vec()]).await;
        assert!(matches!(result, Err(EchoError::Stream(_))));
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_request() {
        let client = GroqClient::new(None, GROQ_API_URL, DEFAULT_MODEL).unwrap();
        assert!(!client.has_credentials());

        let request = CompletionRequest {
            system_prompt: "system".to_string(),
            messages: vec![],
            max_tokens: 150,
            temperature: 0.7,
        };
        let result = client.stream_completion(request).await;
        assert!(matches!(result, Err(EchoError::MissingCredentials("GROQ_API_KEY"))));
    }
}
