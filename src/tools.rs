//! Tools available to the agent and the dispatcher that runs them.
//!
//! Each tool is a `rig::tool::Tool`. A [`ToolDispatcher`] is built per turn so
//! that tools which depend on the attached card see the right one:
//!
//! | Tool | Effect |
//! |---|---|
//! | `create_card` | Surface a card in the UI |
//! | `dismiss_card` / `skip_card` | Resolve the attached card (card chats only) |
//! | `log_action` | Append a ledger entry |
//! | `update_user_context` / `update_memory` / `append_daily_log` | Append to memory |
//! | `memory_get` | Read an allow-listed memory file |

pub mod card_status;
pub mod create_card;
pub mod log_action;
pub mod memory_append;
pub mod memory_get;

pub use card_status::{CardStatusArgs, CardStatusError, CardStatusOutput, DismissCardTool, SkipCardTool};
pub use create_card::{CreateCardArgs, CreateCardError, CreateCardOutput, CreateCardTool};
pub use log_action::{LogActionArgs, LogActionError, LogActionOutput, LogActionTool};
pub use memory_append::{
    AppendDailyLogTool, AppendTarget, MemoryAppendArgs, MemoryAppendError, MemoryAppendOutput,
    MemoryAppendTool, UpdateMemoryTool, UpdateUserContextTool,
};
pub use memory_get::{MemoryGetArgs, MemoryGetError, MemoryGetOutput, MemoryGetTool};

use crate::agent::CardContext;
use crate::cards::CardStore;
use crate::llm::{ToolCall, ToolResult};
use crate::memory::MemoryStore;

use futures::FutureExt as _;
use futures::future::BoxFuture;
use rig::completion::ToolDefinition;
use rig::tool::Tool;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Object-safe view of a [`Tool`] taking raw JSON arguments.
trait RegisteredTool: Send + Sync {
    fn name(&self) -> &'static str;

    fn definition(&self) -> BoxFuture<'_, ToolDefinition>;

    /// Deserialize, run and serialize. `Err` carries a human-readable reason.
    fn invoke(&self, arguments: serde_json::Value) -> BoxFuture<'_, Result<String, String>>;
}

impl<T: Tool + 'static> RegisteredTool for T {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn definition(&self) -> BoxFuture<'_, ToolDefinition> {
        Box::pin(Tool::definition(self, String::new()))
    }

    fn invoke(&self, arguments: serde_json::Value) -> BoxFuture<'_, Result<String, String>> {
        Box::pin(async move {
            let args: T::Args = serde_json::from_value(arguments)
                .map_err(|error| format!("invalid arguments for {}: {error}", T::NAME))?;
            let output = self.call(args).await.map_err(|error| error.to_string())?;
            serde_json::to_string(&output).map_err(|error| error.to_string())
        })
    }
}

/// Maps tool calls to tool implementations and turns every outcome into a
/// [`ToolResult`].
pub struct ToolDispatcher {
    tools: Vec<Box<dyn RegisteredTool>>,
}

impl ToolDispatcher {
    /// Register every tool for one turn. `card` is the card the conversation
    /// is attached to, if any.
    pub fn new(
        cards: Arc<dyn CardStore>,
        memory: Arc<dyn MemoryStore>,
        card: Option<CardContext>,
    ) -> Self {
        let tools: Vec<Box<dyn RegisteredTool>> = vec![
            Box::new(CreateCardTool::new(Arc::clone(&cards))),
            Box::new(DismissCardTool::new(Arc::clone(&cards), card.clone())),
            Box::new(SkipCardTool::new(Arc::clone(&cards), card.clone())),
            Box::new(LogActionTool::new(cards, card)),
            Box::new(UpdateUserContextTool::new(Arc::clone(&memory))),
            Box::new(UpdateMemoryTool::new(Arc::clone(&memory))),
            Box::new(AppendDailyLogTool::new(Arc::clone(&memory))),
            Box::new(MemoryGetTool::new(memory)),
        ];
        Self { tools }
    }

    /// Definitions advertised to the model, in registration order.
    pub async fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions = Vec::with_capacity(self.tools.len());
        for tool in &self.tools {
            definitions.push(tool.definition().await);
        }
        definitions
    }

    /// Run one tool call. Never fails: unknown tools, bad arguments, handler
    /// errors and handler panics all become error results.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.tools.iter().find(|tool| tool.name() == call.name) else {
            tracing::warn!(tool_name = %call.name, "model called an unknown tool");
            return ToolResult::error(call, format!("Unknown tool: {}", call.name));
        };

        let arguments = match &call.arguments {
            serde_json::Value::Null => serde_json::json!({}),
            arguments => arguments.clone(),
        };

        match AssertUnwindSafe(tool.invoke(arguments)).catch_unwind().await {
            Ok(Ok(output)) => {
                tracing::debug!(tool_name = %call.name, "tool call succeeded");
                ToolResult::success(call, output)
            }
            Ok(Err(reason)) => {
                tracing::debug!(tool_name = %call.name, %reason, "tool call failed");
                ToolResult::error(call, format!("Tool error: {reason}"))
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                tracing::error!(tool_name = %call.name, %reason, "tool handler panicked");
                ToolResult::error(call, format!("Tool error: {reason}"))
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "tool handler panicked".to_string()
    }
}
