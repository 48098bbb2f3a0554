//! The agent: prompt assembly, the turn loop and the chat flow built on it.

pub mod chat;
pub mod context;
pub mod turn;

pub use chat::{ChatReply, ChatService, session_key_for};
pub use context::{AgentProfile, CardContext, build_system_prompt};
pub use turn::{AgentTurnEngine, TurnOutcome, TurnRequest};

use crate::cards::CardStore;
use crate::llm::ModelClient;
use crate::memory::MemoryStore;

use std::sync::Arc;

/// External collaborators every turn needs.
#[derive(Clone)]
pub struct AgentDeps {
    pub model: Arc<dyn ModelClient>,
    pub cards: Arc<dyn CardStore>,
    pub memory: Arc<dyn MemoryStore>,
}

impl std::fmt::Debug for AgentDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentDeps").finish_non_exhaustive()
    }
}
