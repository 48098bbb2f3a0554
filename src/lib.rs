//! Switchboard: event ingestion and agent turn coordination for a personal
//! assistant backend.
//!
//! Inbound deliveries are debounced per account, serialized per account and
//! admitted through a global turn semaphore before reaching the agent. Chat
//! messages run the same turn loop under a per-session lock.

pub mod agent;
pub mod cards;
pub mod config;
pub mod conversation;
pub mod error;
pub mod inbound;
pub mod llm;
pub mod memory;
pub mod runtime;
pub mod telemetry;
pub mod tools;

#[cfg(test)]
mod testing;

pub use agent::{AgentDeps, AgentTurnEngine, ChatService, TurnOutcome, TurnRequest};
pub use config::Config;
pub use error::{Error, Result};
pub use runtime::Switchboard;
