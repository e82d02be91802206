//! Line-oriented data-stream protocol spoken by `/api/chat`.
//!
//! One part per line, `<code>:<json>`:
//! - `0:"text"` generated text chunk
//! - `2:[{...}]` data part (terminal event)
//! - `3:"message"` in-band error
//! - `d:{"finishReason":"stop"}` end of response

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conversation::ChatEvent;
use crate::error::{EchoError, Result};

pub const STREAM_HEADER: &str = "x-vercel-ai-data-stream";
pub const STREAM_VERSION: &str = "v1";
pub const CONTENT_TYPE: &str = "text/plain; charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    Stop,
    Error,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinishPayload {
    finish_reason: FinishReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamPart {
    Text(String),
    Data(Vec<Value>),
    Error(String),
    Finish(FinishReason),
}

impl StreamPart {
    /// Wire form including the trailing newline
    pub fn encode(&self) -> Result<String> {
        let (code, payload) = match self {
            StreamPart::Text(text) => ('0', serde_json::to_string(text)?),
            StreamPart::Data(values) => ('2', serde_json::to_string(values)?),
            StreamPart::Error(message) => ('3', serde_json::to_string(message)?),
            StreamPart::Finish(reason) => (
                'd',
                serde_json::to_string(&FinishPayload {
                    finish_reason: *reason,
                })?,
            ),
        };
        Ok(format!("{}:{}\n", code, payload))
    }

    /// Parse one line. Blank lines and part codes this client does not use yield `None`.
    pub fn decode(line: &str) -> Result<Option<StreamPart>> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Ok(None);
        }

        let (code, payload) = line
            .split_once(':')
            .ok_or_else(|| EchoError::Stream(format!("malformed stream line: {}", line)))?;

        let part = match code {
            "0" => StreamPart::Text(serde_json::from_str(payload)?),
            "2" => StreamPart::Data(serde_json::from_str(payload)?),
            "3" => StreamPart::Error(serde_json::from_str(payload)?),
            "d" => {
                let finish: FinishPayload = serde_json::from_str(payload)?;
                StreamPart::Finish(finish.finish_reason)
            }
            _ => return Ok(None),
        };
        Ok(Some(part))
    }

    pub fn from_event(event: &ChatEvent) -> Result<StreamPart> {
        Ok(match event {
            ChatEvent::TextChunk(text) => StreamPart::Text(text.clone()),
            ChatEvent::Terminal(terminal) => StreamPart::Data(vec![serde_json::to_value(terminal)?]),
        })
    }
}
