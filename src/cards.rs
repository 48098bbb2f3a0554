//! UI cards, the action ledger, and the events they broadcast.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

/// Ledger entries retained, newest first.
const MAX_LEDGER_ENTRIES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    Email,
    Calendar,
    System,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum CardPriority {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    Active,
    Dismissed,
    Skipped,
    Acted,
}

/// A button shown on a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CardAction {
    /// Button label shown to the user.
    pub label: String,
    /// Action identifier sent back on click.
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    #[serde(rename = "type")]
    pub card_type: CardType,
    pub title: String,
    pub context: String,
    pub priority: CardPriority,
    pub status: CardStatus,
    pub actions: Vec<CardAction>,
    pub source_type: Option<String>,
    pub source_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when creating a card.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCard {
    pub card_type: CardType,
    pub title: String,
    pub context: Option<String>,
    pub priority: Option<CardPriority>,
    pub actions: Vec<CardAction>,
    pub source_type: Option<String>,
    pub source_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Ingest,
    Sync,
    AutoArchive,
    AutoDecline,
    UserAction,
    Reminder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    pub kind: ActionKind,
    pub ref_type: String,
    pub ref_id: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Fields supplied when recording a ledger entry.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    pub kind: ActionKind,
    pub ref_type: String,
    pub ref_id: String,
    pub details: serde_json::Value,
}

/// Events pushed to connected UI clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum UiEvent {
    #[serde(rename = "card:created")]
    CardCreated(Card),
    #[serde(rename = "card:removed")]
    CardRemoved { id: String, action: String },
    #[serde(rename = "action:recorded")]
    ActionRecorded(LedgerEntry),
    #[serde(rename = "chat:delta", rename_all = "camelCase")]
    ChatDelta { delta: String, session_key: String },
    #[serde(rename = "chat:response", rename_all = "camelCase")]
    ChatResponse { text: String, session_key: String },
}

/// Card and ledger persistence consumed by the tools.
#[async_trait]
pub trait CardStore: Send + Sync {
    async fn create_card(&self, card: NewCard) -> Card;

    /// Dismiss an active card. `None` if the card is unknown or no longer active.
    async fn dismiss_card(&self, id: &str) -> Option<Card>;

    /// Skip an active card. `None` if the card is unknown or no longer active.
    async fn skip_card(&self, id: &str) -> Option<Card>;

    async fn get_card(&self, id: &str) -> Option<Card>;

    async fn record_action(&self, entry: NewLedgerEntry) -> LedgerEntry;
}

#[derive(Debug, Default)]
struct CardState {
    cards: Vec<Card>,
    ledger: VecDeque<LedgerEntry>,
}

/// In-process [`CardStore`] that broadcasts every mutation.
#[derive(Debug)]
pub struct InMemoryCardStore {
    state: Mutex<CardState>,
    events: broadcast::Sender<UiEvent>,
}

impl InMemoryCardStore {
    pub fn new(events: broadcast::Sender<UiEvent>) -> Self {
        Self {
            state: Mutex::new(CardState::default()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.events.subscribe()
    }

    /// Active cards, highest priority first.
    pub fn active_cards(&self) -> Vec<Card> {
        let mut cards: Vec<Card> = self
            .lock()
            .cards
            .iter()
            .filter(|card| card.status == CardStatus::Active)
            .cloned()
            .collect();
        cards.sort_by(|a, b| b.priority.cmp(&a.priority));
        cards
    }

    /// Ledger entries, newest first.
    pub fn ledger(&self) -> Vec<LedgerEntry> {
        self.lock().ledger.iter().cloned().collect()
    }

    /// Apply a user action to an active card and record it in the ledger.
    pub fn act_on_card(&self, id: &str, action: &str) -> Option<Card> {
        let card = {
            let mut state = self.lock();
            let card = state
                .cards
                .iter_mut()
                .find(|card| card.id == id && card.status == CardStatus::Active)?;
            card.status = match action {
                "dismiss" => CardStatus::Dismissed,
                "skip" => CardStatus::Skipped,
                _ => CardStatus::Acted,
            };
            card.clone()
        };

        self.record(NewLedgerEntry {
            kind: ActionKind::UserAction,
            ref_type: "card".to_string(),
            ref_id: card.id.clone(),
            details: serde_json::json!({ "action": action, "cardTitle": card.title }),
        });
        self.broadcast(UiEvent::CardRemoved {
            id: card.id.clone(),
            action: action.to_string(),
        });

        Some(card)
    }

    fn record(&self, entry: NewLedgerEntry) -> LedgerEntry {
        let entry = LedgerEntry {
            id: uuid::Uuid::new_v4().to_string(),
            kind: entry.kind,
            ref_type: entry.ref_type,
            ref_id: entry.ref_id,
            details: entry.details,
            timestamp: Utc::now(),
        };
        {
            let mut state = self.lock();
            state.ledger.push_front(entry.clone());
            state.ledger.truncate(MAX_LEDGER_ENTRIES);
        }
        self.broadcast(UiEvent::ActionRecorded(entry.clone()));
        entry
    }

    fn broadcast(&self, event: UiEvent) {
        // No subscribers is fine; the UI may not be connected.
        let _ = self.events.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, CardState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("card store lock poisoned; recovering state");
                poisoned.into_inner()
            }
        }
    }
}

#[async_trait]
impl CardStore for InMemoryCardStore {
    async fn create_card(&self, card: NewCard) -> Card {
        let card = Card {
            id: uuid::Uuid::new_v4().to_string(),
            card_type: card.card_type,
            title: card.title,
            context: card.context.unwrap_or_default(),
            priority: card.priority.unwrap_or_default(),
            status: CardStatus::Active,
            actions: card.actions,
            source_type: card.source_type,
            source_id: card.source_id,
            created_at: Utc::now(),
        };
        self.lock().cards.push(card.clone());
        tracing::debug!(card_id = %card.id, title = %card.title, "card created");
        self.broadcast(UiEvent::CardCreated(card.clone()));
        card
    }

    async fn dismiss_card(&self, id: &str) -> Option<Card> {
        self.act_on_card(id, "dismiss")
    }

    async fn skip_card(&self, id: &str) -> Option<Card> {
        self.act_on_card(id, "skip")
    }

    async fn get_card(&self, id: &str) -> Option<Card> {
        self.lock().cards.iter().find(|card| card.id == id).cloned()
    }

    async fn record_action(&self, entry: NewLedgerEntry) -> LedgerEntry {
        self.record(entry)
    }
}
