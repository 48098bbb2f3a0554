//! Conversation data model and the model-client seam.
//!
//! The completion call itself lives outside this crate. Implementors of
//! [`ModelClient`] translate [`CompletionRequest`]s into whatever provider API
//! they speak and hand back an [`AssistantMessage`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rig::completion::ToolDefinition;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Receives incremental text fragments while a streaming completion runs.
pub type DeltaSink = mpsc::UnboundedSender<String>;

/// A model-issued request to invoke a named tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// One block of assistant output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentBlock {
    Text { text: String },
    ToolCall(ToolCall),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    Stop,
    ToolUse,
    Length,
    Error,
}

/// A single model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantMessage {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    pub timestamp: DateTime<Utc>,
}

impl AssistantMessage {
    pub fn new(content: Vec<ContentBlock>, stop_reason: StopReason) -> Self {
        Self {
            content,
            stop_reason,
            timestamp: Utc::now(),
        }
    }

    /// Concatenation of every text block, in order.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::ToolCall(_) => None,
            })
            .collect()
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolCall(call) => Some(call),
            ContentBlock::Text { .. } => None,
        })
    }

    pub fn wants_tools(&self) -> bool {
        self.stop_reason == StopReason::ToolUse
    }
}

/// The answer to exactly one [`ToolCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub output: String,
    pub is_error: bool,
    pub timestamp: DateTime<Utc>,
}

impl ToolResult {
    pub fn success(call: &ToolCall, output: impl Into<String>) -> Self {
        Self::build(call, output.into(), false)
    }

    pub fn error(call: &ToolCall, output: impl Into<String>) -> Self {
        Self::build(call, output.into(), true)
    }

    fn build(call: &ToolCall, output: String, is_error: bool) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            output,
            is_error,
            timestamp: Utc::now(),
        }
    }
}

/// A conversation message. Serialized with a `role` tag of
/// `user`, `assistant` or `toolResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "camelCase")]
pub enum Message {
    User {
        content: String,
        timestamp: DateTime<Utc>,
    },
    Assistant(AssistantMessage),
    ToolResult(ToolResult),
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        match self {
            Self::Assistant(message) => Some(message),
            _ => None,
        }
    }
}

/// Everything the model needs for one completion.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub system_prompt: &'a str,
    pub messages: &'a [Message],
    pub tools: &'a [ToolDefinition],
}

/// Error returned by a model client. Provider, transport and decoding
/// failures all collapse into this one kind.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ModelError(String);

impl ModelError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<anyhow::Error> for ModelError {
    fn from(error: anyhow::Error) -> Self {
        Self(format!("{error:#}"))
    }
}

/// The language-model completion call.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<AssistantMessage, ModelError>;

    /// Streaming variant. Clients without native streaming emit each text
    /// block of the finished message as one fragment.
    async fn complete_streaming(
        &self,
        request: CompletionRequest<'_>,
        sink: &DeltaSink,
    ) -> Result<AssistantMessage, ModelError> {
        let message = self.complete(request).await?;
        for block in &message.content {
            if let ContentBlock::Text { text } = block
                && !text.is_empty()
            {
                // A closed sink only means nobody is listening anymore.
                let _ = sink.send(text.clone());
            }
        }
        Ok(message)
    }
}
