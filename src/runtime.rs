//! Wiring of the coordination core into one handle.

use crate::agent::{AgentDeps, AgentTurnEngine, CardContext, ChatReply, ChatService, TurnOutcome, TurnRequest};
use crate::cards::UiEvent;
use crate::config::Config;
use crate::conversation::SessionStore;
use crate::error::Result;
use crate::inbound::{GmailHookPayload, GmailSource, Ingestor, TurnSemaphore};
use crate::llm::Message;

use std::sync::Arc;
use tokio::sync::broadcast;

/// The running coordination core.
///
/// Inbound deliveries and chat messages share one turn semaphore, so the
/// configured concurrency bound holds across both paths. Ingestion keys and
/// session keys are separate lock domains.
pub struct Switchboard {
    engine: Arc<AgentTurnEngine>,
    sessions: Arc<SessionStore>,
    semaphore: TurnSemaphore,
    chat: ChatService,
    gmail: Ingestor<GmailSource>,
}

impl Switchboard {
    /// Build and start the core. Must be called within a tokio runtime.
    pub fn new(config: &Config, deps: AgentDeps, events: broadcast::Sender<UiEvent>) -> Self {
        let engine = Arc::new(AgentTurnEngine::new(deps, config));
        let mut sessions = SessionStore::new(config.max_history_messages);
        if let Some(dir) = &config.history_dir {
            sessions = sessions.with_persistence(dir);
        }
        let sessions = Arc::new(sessions);
        let semaphore = TurnSemaphore::new(config.turn_capacity());

        let chat = ChatService::new(
            Arc::clone(&engine),
            Arc::clone(&sessions),
            semaphore.clone(),
            events,
        );
        let gmail = Ingestor::spawn(GmailSource, Arc::clone(&engine), semaphore.clone(), config);

        tracing::info!(
            max_concurrent_turns = config.turn_capacity(),
            debounce_ms = config.debounce_ms,
            max_iterations = config.max_iterations,
            "switchboard started"
        );

        Self {
            engine,
            sessions,
            semaphore,
            chat,
            gmail,
        }
    }

    /// Run one turn directly under the session lock and a turn permit. The
    /// caller owns the history; nothing is saved to the session store.
    pub async fn run_turn(
        &self,
        session_key: &str,
        message: &str,
        history: Vec<Message>,
        card: Option<CardContext>,
    ) -> Result<TurnOutcome> {
        let engine = Arc::clone(&self.engine);
        let semaphore = self.semaphore.clone();
        let request = TurnRequest::new(session_key, message)
            .with_history(history)
            .with_card(card);

        self.sessions
            .with_lock(session_key, move || async move {
                match semaphore.acquire().await {
                    Ok(_permit) => engine.run_turn(request).await,
                    Err(error) => Err(error.into()),
                }
            })
            .await
    }

    /// Queue a Gmail hook delivery. Returns `false` if it was dropped for
    /// lacking an account.
    pub fn enqueue_inbound(&self, payload: GmailHookPayload) -> bool {
        self.gmail.enqueue(payload)
    }

    pub async fn handle_chat(&self, message: String, card_id: Option<&str>) -> Result<ChatReply> {
        self.chat.handle_message(message, card_id).await
    }

    pub async fn session_history(&self, session_key: &str) -> Vec<Message> {
        self.sessions.history(session_key).await
    }

    /// Flush pending inbound batches, wait for their turns, then refuse new turns.
    pub async fn shutdown(self) {
        self.gmail.shutdown().await;
        self.semaphore.close();
        tracing::info!("switchboard stopped");
    }
}
