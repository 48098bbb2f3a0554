//! Inbound event ingestion: debounce, per-account serialization, admission control.
//!
//! An item flows through [`Debouncer`] (grouped by ingestion key), then
//! [`KeyedSerializer`] (one turn per key at a time), then [`TurnSemaphore`]
//! (bounded turns system-wide) before reaching the agent.

pub mod debounce;
pub mod gmail;
pub mod semaphore;
pub mod serializer;

pub use debounce::{DebounceConfig, Debouncer};
pub use gmail::{GmailHookPayload, GmailSource};
pub use semaphore::{TurnPermit, TurnSemaphore};
pub use serializer::KeyedSerializer;

use crate::agent::{AgentTurnEngine, TurnRequest};
use crate::config::Config;

use std::sync::Arc;

/// A kind of inbound event and how to turn batches of it into agent turns.
pub trait InboundSource: Send + Sync + 'static {
    type Item: Send + 'static;

    /// Grouping key for debouncing and serialization. `None` drops the item.
    fn ingestion_key(&self, item: &Self::Item) -> Option<String>;

    /// Session key the resulting turn runs under.
    fn session_key(&self, ingestion_key: &str) -> String;

    /// Render a flushed batch as the turn's input message.
    fn describe(&self, batch: &[Self::Item]) -> String;
}

/// Entry point for externally triggered events of one source.
pub struct Ingestor<S: InboundSource> {
    debouncer: Debouncer<String, S::Item>,
}

impl<S: InboundSource> Ingestor<S> {
    /// Start ingestion. Must be called within a tokio runtime.
    pub fn spawn(
        source: S,
        engine: Arc<AgentTurnEngine>,
        semaphore: TurnSemaphore,
        config: &Config,
    ) -> Self {
        let source = Arc::new(source);
        let serializer = Arc::new(KeyedSerializer::new());
        let key_source = Arc::clone(&source);

        let debouncer = Debouncer::spawn(
            DebounceConfig::new(config.debounce_window(), config.max_batch_items),
            move |item: &S::Item| key_source.ingestion_key(item),
            move |key: String, batch: Vec<S::Item>| {
                let source = Arc::clone(&source);
                let engine = Arc::clone(&engine);
                let semaphore = semaphore.clone();
                serializer.run(key.clone(), move || {
                    run_batch(source, engine, semaphore, key, batch)
                })
            },
            |key: &String, error: &anyhow::Error| {
                tracing::error!(ingestion_key = %key, %error, "inbound agent turn failed");
            },
        );

        Self { debouncer }
    }

    /// Queue an inbound item. Returns `false` if it was dropped.
    pub fn enqueue(&self, item: S::Item) -> bool {
        self.debouncer.enqueue(item)
    }

    /// Flush pending batches and wait for their turns to finish.
    pub async fn shutdown(self) {
        self.debouncer.shutdown().await;
    }
}

async fn run_batch<S: InboundSource>(
    source: Arc<S>,
    engine: Arc<AgentTurnEngine>,
    semaphore: TurnSemaphore,
    ingestion_key: String,
    batch: Vec<S::Item>,
) -> anyhow::Result<()> {
    let _permit = semaphore.acquire().await?;
    let session_key = source.session_key(&ingestion_key);
    let message = source.describe(&batch);

    let outcome = engine
        .run_turn(TurnRequest::new(session_key.clone(), message))
        .await?;

    tracing::info!(
        ingestion_key = %ingestion_key,
        session_key = %session_key,
        batch_size = batch.len(),
        tool_call_count = outcome.tool_call_count,
        "inbound agent turn completed"
    );
    Ok(())
}
