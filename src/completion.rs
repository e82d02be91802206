//! Seam between the conversation engine and a hosted text-completion service.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::error::Result;
use crate::models::Message;

/// Generated text deltas in arrival order
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Start a completion. Errors before the first token surface here; later
    /// errors arrive as stream items. Dropping the stream abandons the request.
    async fn stream_completion(&self, request: CompletionRequest) -> Result<TokenStream>;

    fn model_name(&self) -> &str;
}
