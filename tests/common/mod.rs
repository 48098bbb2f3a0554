//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use switchboard::AgentDeps;
use switchboard::cards::{InMemoryCardStore, UiEvent};
use switchboard::llm::{
    AssistantMessage, CompletionRequest, ContentBlock, Message, ModelClient, ModelError,
    StopReason,
};
use switchboard::memory::{MemoryFile, MemoryStore, PromptSources};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

/// One observed model call.
#[derive(Debug, Clone)]
pub struct ObservedCall {
    pub at: Instant,
    pub last_user_message: String,
    pub message_count: usize,
}

/// Model that replies with fixed text after an optional delay and reports
/// every call on a channel.
pub struct RecordingModel {
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: mpsc::UnboundedSender<ObservedCall>,
}

impl RecordingModel {
    pub fn new(delay: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<ObservedCall>) {
        let (calls, observed) = mpsc::unbounded_channel();
        let model = Arc::new(Self {
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls,
        });
        (model, observed)
    }

    /// Highest number of overlapping calls seen.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for RecordingModel {
    async fn complete(
        &self,
        request: CompletionRequest<'_>,
    ) -> Result<AssistantMessage, ModelError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        let last_user_message = request
            .messages
            .iter()
            .rev()
            .find_map(|message| match message {
                Message::User { content, .. } => Some(content.clone()),
                _ => None,
            })
            .unwrap_or_default();
        let _ = self.calls.send(ObservedCall {
            at: Instant::now(),
            last_user_message,
            message_count: request.messages.len(),
        });

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(AssistantMessage::new(
            vec![ContentBlock::text("Handled.")],
            StopReason::Stop,
        ))
    }
}

/// Memory store that keeps nothing on disk.
#[derive(Default)]
pub struct StubMemory;

#[async_trait]
impl MemoryStore for StubMemory {
    async fn load_prompt_sources(&self) -> switchboard::Result<PromptSources> {
        Ok(PromptSources {
            agent_profile: Some("name: test\n\nYou are a test assistant.".to_string()),
            ..PromptSources::default()
        })
    }

    async fn append_user_context(&self, _text: &str) -> switchboard::Result<()> {
        Ok(())
    }

    async fn append_memory(&self, _text: &str) -> switchboard::Result<()> {
        Ok(())
    }

    async fn append_daily_log(&self, _text: &str) -> switchboard::Result<()> {
        Ok(())
    }

    async fn read_memory_file(
        &self,
        path: &str,
        _from: Option<usize>,
        _count: Option<usize>,
    ) -> switchboard::Result<MemoryFile> {
        Ok(MemoryFile {
            path: path.to_string(),
            text: String::new(),
        })
    }
}

pub fn deps(model: Arc<RecordingModel>) -> (AgentDeps, broadcast::Sender<UiEvent>) {
    let (events, _) = broadcast::channel(256);
    let deps = AgentDeps {
        model,
        cards: Arc::new(InMemoryCardStore::new(events.clone())),
        memory: Arc::new(StubMemory),
    };
    (deps, events)
}
