//! HTTP client for a remote `/api/chat` endpoint.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::conversation::{ChatEvent, ConversationBackend, EventStream};
use crate::error::{EchoError, Result};
use crate::logging;
use crate::models::{Message, TerminalEvent};
use crate::wire::{FinishReason, StreamPart};

const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: &'a [Message],
}

pub struct EchoClient {
    client: Client,
    endpoint: String,
}

impl EchoClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/api/chat", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Post the transcript and decode the streamed reply
    pub async fn send(&self, messages: &[Message]) -> Result<EventStream> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ChatRequest { messages })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            logging::log_provider(None, &format!("Chat endpoint error ({}): {}", status, message));
            return Err(EchoError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        Ok(Box::pin(decode_events(response.bytes_stream())))
    }
}

#[async_trait]
impl ConversationBackend for EchoClient {
    async fn open(&self, messages: Vec<Message>, cancel: CancellationToken) -> Result<EventStream> {
        let events = self.send(&messages).await?;
        Ok(Box::pin(events.take_until(cancel.cancelled_owned())))
    }
}

/// Map one decoded part to an event. `Ok(None)` means nothing to surface.
fn part_to_event(part: StreamPart) -> Result<Option<ChatEvent>> {
    match part {
        StreamPart::Text(text) => Ok(Some(ChatEvent::TextChunk(text))),
        StreamPart::Data(values) => {
            for value in values {
                if let Ok(terminal) = serde_json::from_value::<TerminalEvent>(value) {
                    if terminal.should_end {
                        return Ok(Some(ChatEvent::Terminal(terminal)));
                    }
                }
            }
            Ok(None)
        }
        StreamPart::Error(message) => Err(EchoError::Stream(message)),
        StreamPart::Finish(FinishReason::Error) => {
            Err(EchoError::Stream("reply ended with an error".to_string()))
        }
        StreamPart::Finish(FinishReason::Stop) => Ok(None),
    }
}

/// Decode a data-stream body into chat events. Stops at the finish part.
pub fn decode_events<S, E>(bytes: S) -> impl Stream<Item = Result<ChatEvent>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Into<EchoError> + Send + 'static,
{
    async_stream::stream! {
        let mut bytes = Box::pin(bytes);
        let mut buffer: Vec<u8> = Vec::new();

        loop {
            let line: Vec<u8> = match buffer.iter().position(|b| *b == b'\n') {
                Some(pos) => buffer.drain(..=pos).collect(),
                None => match bytes.next().await {
                    Some(Ok(chunk)) => {
                        buffer.extend_from_slice(&chunk);
                        continue;
                    }
                    Some(Err(e)) => {
                        yield Err(Into::<EchoError>::into(e));
                        return;
                    }
                    // body ended without a trailing newline
                    None if !buffer.is_empty() => std::mem::take(&mut buffer),
                    None => return,
                },
            };

            let part = match StreamPart::decode(&String::from_utf8_lossy(&line)) {
                Ok(Some(part)) => part,
                Ok(None) => continue,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            let finished = matches!(part, StreamPart::Finish(_));

            match part_to_event(part) {
                Ok(Some(event)) => yield Ok(event),
                Ok(None) => {}
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
            if finished {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Emotion;
    use futures::stream;

    async fn decode(parts: Vec<&str>) -> (Vec<ChatEvent>, Option<EchoError>) {
        let chunks: Vec<std::result::Result<Bytes, EchoError>> = parts
            .into_iter()
            .map(|p| Ok(Bytes::from(p.as_bytes().to_vec())))
            .collect();
        let mut events = Box::pin(decode_events(stream::iter(chunks)));

        let mut out = Vec::new();
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => out.push(event),
                Err(e) => return (out, Some(e)),
            }
        }
        (out, None)
    }

    const TERMINAL: &str = r#"2:[{"shouldEnd":true,"result":{"emotion":"envy","suggestion":{"title":"模仿一步","type":"micro_action","desc":"d","tag":"行动跟随"}}}]"#;

    #[tokio::test]
    async fn test_decodes_text_and_terminal() {
        let body = format!("0:\"我\"\n0:\"听到了\"\n{}\nd:{{\"finishReason\":\"stop\"}}\n", TERMINAL);
        // split mid-line to exercise buffering
        let (head, tail) = body.split_at(body.find("听").unwrap());
        let (events, err) = decode(vec![head, tail]).await;

        assert!(err.is_none());
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], ChatEvent::TextChunk("我".to_string()));
        assert_eq!(events[1], ChatEvent::TextChunk("听到了".to_string()));
        let ChatEvent::Terminal(terminal) = &events[2] else {
            panic!("expected terminal");
        };
        assert_eq!(terminal.result.emotion, Emotion::Envy);
        assert_eq!(terminal.result.suggestion.title, "模仿一步");
    }

    #[tokio::test]
    async fn test_in_band_error() {
        let (events, err) = decode(vec!["0:\"我\"\n3:\"Failed\"\nd:{\"finishReason\":\"error\"}\n"]).await;
        assert_eq!(events, vec![ChatEvent::TextChunk("我".to_string())]);
        assert!(matches!(err, Some(EchoError::Stream(msg)) if msg == "Failed"));
    }

    #[tokio::test]
    async fn test_stops_at_finish() {
        let (events, err) = decode(vec!["0:\"a\"\nd:{\"finishReason\":\"stop\"}\n0:\"b\"\n"]).await;
        assert!(err.is_none());
        assert_eq!(events, vec![ChatEvent::TextChunk("a".to_string())]);
    }

    #[tokio::test]
    async fn test_unterminated_last_line() {
        let (events, err) = decode(vec!["0:\"a\"\n0:\"b\""]).await;
        assert!(err.is_none());
        assert_eq!(
            events,
            vec![ChatEvent::TextChunk("a".to_string()), ChatEvent::TextChunk("b".to_string())]
        );
    }

    #[tokio::test]
    async fn test_unrelated_data_is_ignored() {
        let (events, err) = decode(vec!["2:[{\"progress\":1}]\n0:\"a\"\n"]).await;
        assert!(err.is_none());
        assert_eq!(events, vec![ChatEvent::TextChunk("a".to_string())]);
    }

    #[test]
    fn test_endpoint_path() {
        let client = EchoClient::new("http://127.0.0.1:3000/").unwrap();
        assert_eq!(client.endpoint(), "http://127.0.0.1:3000/api/chat");
    }
}
