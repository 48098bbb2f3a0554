//! Interactive chat: one streaming turn per message, serialized per session.

use crate::agent::{AgentTurnEngine, CardContext, TurnRequest};
use crate::cards::UiEvent;
use crate::conversation::SessionStore;
use crate::error::Result;
use crate::inbound::TurnSemaphore;
use crate::llm::Message;

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

const GENERAL_SESSION: &str = "ui:chat:general";

/// Session key for a chat, scoped to a card when one is given.
pub fn session_key_for(card_id: Option<&str>) -> String {
    match card_id {
        Some(card_id) => format!("ui:chat:{card_id}"),
        None => GENERAL_SESSION.to_string(),
    }
}

/// What a chat message produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub session_key: String,
    pub text: String,
    pub tool_call_count: usize,
}

/// Runs chat turns and streams them to UI clients.
///
/// Each message holds its session's lock for the whole turn and a turn permit
/// while the model runs. Text fragments go out as `chat:delta` events; every
/// completed turn ends with exactly one `chat:response`.
#[derive(Clone)]
pub struct ChatService {
    engine: Arc<AgentTurnEngine>,
    sessions: Arc<SessionStore>,
    semaphore: TurnSemaphore,
    events: broadcast::Sender<UiEvent>,
}

impl ChatService {
    pub fn new(
        engine: Arc<AgentTurnEngine>,
        sessions: Arc<SessionStore>,
        semaphore: TurnSemaphore,
        events: broadcast::Sender<UiEvent>,
    ) -> Self {
        Self {
            engine,
            sessions,
            semaphore,
            events,
        }
    }

    #[tracing::instrument(skip(self, message, card_id), fields(card_id = card_id.unwrap_or("-")))]
    pub async fn handle_message(&self, message: String, card_id: Option<&str>) -> Result<ChatReply> {
        let session_key = session_key_for(card_id);
        let card = match card_id {
            Some(card_id) => {
                let card = self.engine.deps().cards.get_card(card_id).await;
                if card.is_none() {
                    tracing::warn!(card_id, "chat references an unknown card");
                }
                card.as_ref().map(CardContext::from)
            }
            None => None,
        };

        let engine = Arc::clone(&self.engine);
        let sessions = Arc::clone(&self.sessions);
        let semaphore = self.semaphore.clone();
        let events = self.events.clone();
        let key = session_key.clone();

        self.sessions
            .with_lock(&session_key, move || async move {
                let _permit = semaphore.acquire().await?;
                let history = sessions.history(&key).await;

                let (delta_tx, delta_rx) = mpsc::unbounded_channel();
                let forwarder = tokio::spawn(forward_deltas(delta_rx, events.clone(), key.clone()));

                let request = TurnRequest::new(key.clone(), message)
                    .with_history(history)
                    .with_card(card);
                let result = engine.run_turn_streaming(request, &delta_tx).await;

                // All deltas must reach clients before the final response.
                drop(delta_tx);
                if let Err(error) = forwarder.await {
                    tracing::warn!(%error, "chat delta forwarder failed");
                }

                let outcome = result?;
                if let Err(error) = sessions.set_history(&key, outcome.history).await {
                    tracing::warn!(%error, session_key = %key, "failed to persist chat history");
                }

                let _ = events.send(UiEvent::ChatResponse {
                    text: outcome.text.clone(),
                    session_key: key.clone(),
                });

                Ok::<_, crate::Error>(ChatReply {
                    session_key: key,
                    text: outcome.text,
                    tool_call_count: outcome.tool_call_count,
                })
            })
            .await
    }

    /// Stored history for a session.
    pub async fn history(&self, session_key: &str) -> Vec<Message> {
        self.sessions.history(session_key).await
    }
}

async fn forward_deltas(
    mut deltas: mpsc::UnboundedReceiver<String>,
    events: broadcast::Sender<UiEvent>,
    session_key: String,
) {
    while let Some(delta) = deltas.recv().await {
        // Nobody listening is fine.
        let _ = events.send(UiEvent::ChatDelta {
            delta,
            session_key: session_key.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentDeps;
    use crate::cards::{CardPriority, CardStore, CardType, InMemoryCardStore, NewCard};
    use crate::config::Config;
    use crate::llm::ModelError;
    use crate::memory::FileMemoryStore;
    use crate::testing::{ScriptedModel, reply, tool_use};

    struct Harness {
        chat: ChatService,
        cards: Arc<InMemoryCardStore>,
        events: broadcast::Receiver<UiEvent>,
        _dir: tempfile::TempDir,
    }

    fn harness(model: ScriptedModel) -> Harness {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let (events, receiver) = broadcast::channel(256);
        let cards = Arc::new(InMemoryCardStore::new(events.clone()));
        let deps = AgentDeps {
            model: Arc::new(model),
            cards: cards.clone(),
            memory: Arc::new(FileMemoryStore::new(dir.path())),
        };
        let config = Config::default();
        let engine = Arc::new(AgentTurnEngine::new(deps, &config));
        let chat = ChatService::new(
            engine,
            Arc::new(SessionStore::new(config.max_history_messages)),
            TurnSemaphore::new(config.turn_capacity()),
            events,
        );
        Harness {
            chat,
            cards,
            events: receiver,
            _dir: dir,
        }
    }

    fn drain(events: &mut broadcast::Receiver<UiEvent>) -> Vec<UiEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = events.try_recv() {
            drained.push(event);
        }
        drained
    }

    #[test]
    fn session_keys() {
        assert_eq!(session_key_for(None), "ui:chat:general");
        assert_eq!(session_key_for(Some("c-1")), "ui:chat:c-1");
    }

    #[tokio::test]
    async fn streams_deltas_then_one_response_and_saves_history() {
        let mut harness = harness(ScriptedModel::new(vec![Ok(reply("Your inbox is clear."))]));
        let answer = harness
            .chat
            .handle_message("anything new?".to_string(), None)
            .await
            .expect("chat turn should succeed");

        assert_eq!(answer.session_key, "ui:chat:general");
        assert_eq!(answer.text, "Your inbox is clear.");
        assert_eq!(
            drain(&mut harness.events),
            vec![
                UiEvent::ChatDelta {
                    delta: "Your inbox is clear.".to_string(),
                    session_key: "ui:chat:general".to_string(),
                },
                UiEvent::ChatResponse {
                    text: "Your inbox is clear.".to_string(),
                    session_key: "ui:chat:general".to_string(),
                },
            ]
        );
        assert_eq!(harness.chat.history("ui:chat:general").await.len(), 2);
    }

    #[tokio::test]
    async fn history_carries_into_the_next_message() {
        let harness = harness(ScriptedModel::new(vec![Ok(reply("one")), Ok(reply("two"))]));
        harness
            .chat
            .handle_message("first".to_string(), None)
            .await
            .expect("first turn should succeed");
        harness
            .chat
            .handle_message("second".to_string(), None)
            .await
            .expect("second turn should succeed");

        assert_eq!(harness.chat.history("ui:chat:general").await.len(), 4);
    }

    #[tokio::test]
    async fn card_chat_can_dismiss_its_card() {
        let mut harness = harness(ScriptedModel::new(vec![
            Ok(tool_use("dismiss_card", serde_json::json!({}))),
            Ok(reply("Dismissed.")),
        ]));
        let card = harness
            .cards
            .create_card(NewCard {
                card_type: CardType::Email,
                title: "Newsletter digest".to_string(),
                context: None,
                priority: Some(CardPriority::Low),
                actions: Vec::new(),
                source_type: None,
                source_id: None,
            })
            .await;
        drain(&mut harness.events);

        let answer = harness
            .chat
            .handle_message("dismiss this".to_string(), Some(&card.id))
            .await
            .expect("chat turn should succeed");

        assert_eq!(answer.session_key, format!("ui:chat:{}", card.id));
        assert_eq!(answer.tool_call_count, 1);
        assert!(harness.cards.active_cards().is_empty());
    }

    #[tokio::test]
    async fn model_failure_skips_response_and_keeps_history() {
        let mut harness = harness(ScriptedModel::new(vec![Err(ModelError::new("rate limited"))]));
        let error = harness
            .chat
            .handle_message("hello".to_string(), None)
            .await
            .expect_err("model failure must reach the caller");

        assert!(error.to_string().contains("rate limited"));
        assert!(drain(&mut harness.events).is_empty());
        assert!(harness.chat.history("ui:chat:general").await.is_empty());
    }
}
