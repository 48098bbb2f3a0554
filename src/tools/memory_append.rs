//! Append-only memory tools: user context, long-term memory, daily log.

use crate::memory::MemoryStore;

use futures::future::BoxFuture;
use rig::completion::ToolDefinition;
use rig::tool::Tool;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;

/// Which memory file a [`MemoryAppendTool`] writes to.
pub trait AppendTarget: Send + Sync + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;
    const CONFIRMATION: &'static str;

    fn append<'a>(store: &'a dyn MemoryStore, text: &'a str) -> BoxFuture<'a, crate::Result<()>>;
}

/// `user.md`: preferences, contacts and patterns about the user.
pub struct UserContext;

impl AppendTarget for UserContext {
    const NAME: &'static str = "update_user_context";
    const DESCRIPTION: &'static str = "Append new information about the user to user.md. \
        Use this when you observe a preference, contact, or pattern worth remembering across sessions.";
    const CONFIRMATION: &'static str = "User context updated.";

    fn append<'a>(store: &'a dyn MemoryStore, text: &'a str) -> BoxFuture<'a, crate::Result<()>> {
        store.append_user_context(text)
    }
}

/// `MEMORY.md`: durable facts and decisions.
pub struct LongTermMemory;

impl AppendTarget for LongTermMemory {
    const NAME: &'static str = "update_memory";
    const DESCRIPTION: &'static str = "Append a durable fact or decision to MEMORY.md. \
        Use this for things that should shape every future session.";
    const CONFIRMATION: &'static str = "Long-term memory updated.";

    fn append<'a>(store: &'a dyn MemoryStore, text: &'a str) -> BoxFuture<'a, crate::Result<()>> {
        store.append_memory(text)
    }
}

/// `memory/YYYY-MM-DD.md`: running notes for today.
pub struct DailyLog;

impl AppendTarget for DailyLog {
    const NAME: &'static str = "append_daily_log";
    const DESCRIPTION: &'static str = "Append a short note to today's daily log. \
        Use this for what happened today that may matter tomorrow.";
    const CONFIRMATION: &'static str = "Daily log updated.";

    fn append<'a>(store: &'a dyn MemoryStore, text: &'a str) -> BoxFuture<'a, crate::Result<()>> {
        store.append_daily_log(text)
    }
}

pub type UpdateUserContextTool = MemoryAppendTool<UserContext>;
pub type UpdateMemoryTool = MemoryAppendTool<LongTermMemory>;
pub type AppendDailyLogTool = MemoryAppendTool<DailyLog>;

/// Tool that appends markdown to one memory file.
pub struct MemoryAppendTool<T> {
    memory: Arc<dyn MemoryStore>,
    target: PhantomData<T>,
}

impl<T> MemoryAppendTool<T> {
    pub fn new(memory: Arc<dyn MemoryStore>) -> Self {
        Self {
            memory,
            target: PhantomData,
        }
    }
}

impl<T> Clone for MemoryAppendTool<T> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.memory))
    }
}

/// Error type for the memory append tools.
#[derive(Debug, thiserror::Error)]
#[error("Memory update failed: {0}")]
pub struct MemoryAppendError(String);

impl From<crate::error::Error> for MemoryAppendError {
    fn from(error: crate::error::Error) -> Self {
        MemoryAppendError(format!("{error}"))
    }
}

/// Arguments for the memory append tools.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct MemoryAppendArgs {
    /// Markdown content to append.
    pub content: String,
}

/// Output from the memory append tools.
#[derive(Debug, Serialize)]
pub struct MemoryAppendOutput {
    pub success: bool,
    pub message: String,
}

impl<T: AppendTarget> Tool for MemoryAppendTool<T> {
    const NAME: &'static str = T::NAME;

    type Error = MemoryAppendError;
    type Args = MemoryAppendArgs;
    type Output = MemoryAppendOutput;

    async fn definition(&self, _prompt: String) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.to_string(),
            description: T::DESCRIPTION.to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "content": {
                        "type": "string",
                        "description": "Markdown content to append. Be concise and factual."
                    }
                },
                "required": ["content"]
            }),
        }
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let content = args.content.trim();
        if content.is_empty() {
            return Err(MemoryAppendError("content must not be empty".to_string()));
        }

        T::append(self.memory.as_ref(), content).await?;
        tracing::debug!(tool = T::NAME, bytes = content.len(), "memory appended");

        Ok(MemoryAppendOutput {
            success: true,
            message: T::CONFIRMATION.to_string(),
        })
    }
}
