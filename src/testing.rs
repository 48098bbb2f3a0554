//! Test doubles shared by unit tests.

use crate::llm::{
    AssistantMessage, CompletionRequest, ContentBlock, ModelClient, ModelError, StopReason,
    ToolCall,
};
use crate::memory::{MemoryFile, MemoryStore, PromptSources};

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_CALL_ID: AtomicUsize = AtomicUsize::new(0);

/// Assistant message that ends the turn with `text`.
pub fn reply(text: &str) -> AssistantMessage {
    AssistantMessage::new(vec![ContentBlock::text(text)], StopReason::Stop)
}

/// Assistant message requesting one tool call.
pub fn tool_use(name: &str, arguments: serde_json::Value) -> AssistantMessage {
    let id = NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed);
    AssistantMessage::new(
        vec![ContentBlock::ToolCall(ToolCall {
            id: format!("call-{id}"),
            name: name.to_string(),
            arguments,
        })],
        StopReason::ToolUse,
    )
}

/// Model that plays back a fixed script, then replies with empty text.
pub struct ScriptedModel {
    script: Mutex<VecDeque<Result<AssistantMessage, ModelError>>>,
    repeat: Option<AssistantMessage>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<(String, String, usize)>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<Result<AssistantMessage, ModelError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Model that returns `response` on every call.
    pub fn always(response: AssistantMessage) -> Self {
        Self {
            repeat: Some(response),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Message count of every request, in call order.
    pub fn seen_message_counts(&self) -> Vec<usize> {
        self.prompts
            .lock()
            .expect("prompt log poisoned")
            .iter()
            .map(|(_, _, count)| *count)
            .collect()
    }

    /// Model name and system prompt of the latest request.
    pub fn last_prompt(&self) -> Option<(String, String)> {
        self.prompts
            .lock()
            .expect("prompt log poisoned")
            .last()
            .map(|(model, prompt, _)| (model.clone(), prompt.clone()))
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<AssistantMessage, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().expect("prompt log poisoned").push((
            request.model.to_string(),
            request.system_prompt.to_string(),
            request.messages.len(),
        ));

        if let Some(response) = &self.repeat {
            return Ok(response.clone());
        }
        self.script
            .lock()
            .expect("script poisoned")
            .pop_front()
            .unwrap_or_else(|| Ok(reply("")))
    }
}

/// Memory store whose writes panic.
pub struct PanickingMemory;

#[async_trait]
impl MemoryStore for PanickingMemory {
    async fn load_prompt_sources(&self) -> crate::Result<PromptSources> {
        Ok(PromptSources::default())
    }

    async fn append_user_context(&self, _text: &str) -> crate::Result<()> {
        panic!("memory backend exploded");
    }

    async fn append_memory(&self, _text: &str) -> crate::Result<()> {
        panic!("memory backend exploded");
    }

    async fn append_daily_log(&self, _text: &str) -> crate::Result<()> {
        panic!("memory backend exploded");
    }

    async fn read_memory_file(
        &self,
        path: &str,
        _from: Option<usize>,
        _count: Option<usize>,
    ) -> crate::Result<MemoryFile> {
        Ok(MemoryFile {
            path: path.to_string(),
            text: String::new(),
        })
    }
}
