//! Conversation engine: streams the companion's reply and, once the
//! transcript is long enough, closes the conversation with a classified
//! emotion and a suggestion.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::classifier;
use crate::completion::{CompletionModel, CompletionRequest};
use crate::error::Result;
use crate::logging;
use crate::models::{ConversationResult, Message, TerminalEvent};
use crate::prompts::ECHO_SYSTEM_PROMPT;
use crate::suggestions;

pub const MAX_OUTPUT_TOKENS: u32 = 150;
pub const TEMPERATURE: f32 = 0.7;

/// One item of a reply stream. A `Terminal`, when present, is always last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum ChatEvent {
    TextChunk(String),
    Terminal(TerminalEvent),
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<ChatEvent>> + Send>>;

/// Anything that can carry a transcript to the companion and stream back its reply
#[async_trait]
pub trait ConversationBackend: Send + Sync {
    /// Errors before the reply starts are returned directly; cancelling
    /// `cancel` ends the stream early without a terminal event.
    async fn open(&self, messages: Vec<Message>, cancel: CancellationToken) -> Result<EventStream>;
}

#[derive(Clone)]
pub struct ConversationEngine {
    model: Arc<dyn CompletionModel>,
    rng: Arc<Mutex<StdRng>>,
}

impl ConversationEngine {
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self::with_rng(model, StdRng::from_os_rng())
    }

    pub fn with_rng(model: Arc<dyn CompletionModel>, rng: StdRng) -> Self {
        Self {
            model,
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Classify the whole exchange and pick a suggestion for it
    pub fn conclude(&self, messages: &[Message], reply: &str) -> ConversationResult {
        let emotion = classifier::classify(&classifier::conversation_text(messages, reply));
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        ConversationResult {
            emotion,
            suggestion: suggestions::pick(emotion, &mut *rng),
        }
    }

    /// Stream the reply to `messages`.
    pub async fn respond(&self, messages: Vec<Message>, cancel: CancellationToken) -> Result<EventStream> {
        let conversation_id = Uuid::new_v4().to_string();
        let should_end = classifier::should_end(messages.len());

        logging::log_conversation(
            Some(&conversation_id),
            &format!(
                "{} messages, model={}, shouldEnd={}",
                messages.len(),
                self.model.model_name(),
                should_end
            ),
        );

        let request = CompletionRequest {
            system_prompt: ECHO_SYSTEM_PROMPT.to_string(),
            messages: messages.clone(),
            max_tokens: MAX_OUTPUT_TOKENS,
            temperature: TEMPERATURE,
        };

        let mut tokens = self.model.stream_completion(request).await.map_err(|e| {
            logging::log_error(Some(&conversation_id), &format!("Model start failed: {}", e));
            e
        })?;

        let engine = self.clone();
        let stream = async_stream::stream! {
            let mut reply = String::new();
            let mut cancelled = false;

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    item = tokens.next() => Some(item),
                };
                let Some(item) = next else {
                    cancelled = true;
                    break;
                };
                let chunk: String = match item {
                    Some(Ok(chunk)) => chunk,
                    Some(Err(e)) => {
                        logging::log_error(Some(&conversation_id), &format!("Reply stream failed: {}", e));
                        yield Err(e);
                        return;
                    }
                    None => break,
                };
                if chunk.is_empty() {
                    continue;
                }
                reply.push_str(&chunk);
                yield Ok(ChatEvent::TextChunk(chunk));
            }

            if cancelled {
                logging::log_conversation(Some(&conversation_id), "Cancelled by caller");
            } else {
                logging::log_conversation(
                    Some(&conversation_id),
                    &format!("Reply complete ({} chars)", reply.chars().count()),
                );

                if should_end {
                    let result = engine.conclude(&messages, &reply);
                    logging::log_classify(
                        Some(&conversation_id),
                        &format!("emotion={} suggestion={}", result.emotion, result.suggestion.title),
                    );
                    yield Ok(ChatEvent::Terminal(TerminalEvent::new(result)));
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl ConversationBackend for ConversationEngine {
    async fn open(&self, messages: Vec<Message>, cancel: CancellationToken) -> Result<EventStream> {
        self.respond(messages, cancel).await
    }
}
