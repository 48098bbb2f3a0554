//! Per-session conversation history and turn locking.

use crate::inbound::KeyedSerializer;
use crate::llm::Message;

use anyhow::Context as _;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// Bounded conversation history per session, plus a per-session turn lock.
///
/// Histories are always copied in and out; no caller ever holds a reference
/// into the store. The turn lock is a separate lock domain from ingestion
/// serialization even when the same account name appears in both keys.
#[derive(Debug)]
pub struct SessionStore {
    histories: Mutex<HashMap<String, Vec<Message>>>,
    turn_locks: KeyedSerializer<String>,
    max_messages: usize,
    persist_dir: Option<PathBuf>,
}

impl SessionStore {
    pub fn new(max_messages: usize) -> Self {
        Self {
            histories: Mutex::new(HashMap::new()),
            turn_locks: KeyedSerializer::new(),
            max_messages: max_messages.max(1),
            persist_dir: None,
        }
    }

    /// Persist histories as JSON files under `dir`.
    pub fn with_persistence(mut self, dir: impl Into<PathBuf>) -> Self {
        self.persist_dir = Some(dir.into());
        self
    }

    /// Snapshot of the stored history, or empty for an unknown session.
    ///
    /// A persisted history that cannot be parsed is logged and treated as empty.
    pub async fn history(&self, session_key: &str) -> Vec<Message> {
        if let Some(history) = self.lock().get(session_key) {
            return history.clone();
        }

        let Some(path) = self.history_path(session_key) else {
            return Vec::new();
        };
        let history = match tokio::fs::read(&path).await {
            Ok(raw) => match serde_json::from_slice::<Vec<Message>>(&raw) {
                Ok(history) => history,
                Err(error) => {
                    tracing::warn!(%error, session_key, path = %path.display(), "discarding unparseable session history");
                    Vec::new()
                }
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(error) => {
                tracing::warn!(%error, session_key, path = %path.display(), "failed to read session history");
                Vec::new()
            }
        };
        let history = self.truncate(history);

        // A concurrent save wins over what was on disk.
        self.lock()
            .entry(session_key.to_string())
            .or_insert(history)
            .clone()
    }

    /// Replace the stored history, keeping only the most recent messages.
    ///
    /// The in-memory copy is always updated; a persistence failure is returned
    /// for the caller to log.
    pub async fn set_history(&self, session_key: &str, history: Vec<Message>) -> crate::Result<()> {
        let history = self.truncate(history);
        let snapshot = self
            .persist_dir
            .is_some()
            .then(|| serde_json::to_vec(&history))
            .transpose()
            .context("failed to serialize session history")?;
        self.lock().insert(session_key.to_string(), history);

        if let (Some(raw), Some(path)) = (snapshot, self.history_path(session_key)) {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            tokio::fs::write(&path, raw)
                .await
                .with_context(|| format!("failed to write session history {}", path.display()))?;
        }
        Ok(())
    }

    /// Run `operation` with exclusive access to the session.
    ///
    /// Calls for the same key run one at a time in submission order; a failing
    /// call does not block the ones queued behind it.
    pub fn with_lock<F, Fut, T>(
        &self,
        session_key: &str,
        operation: F,
    ) -> impl Future<Output = T> + Send + use<F, Fut, T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.turn_locks.run(session_key.to_string(), operation)
    }

    fn truncate(&self, mut history: Vec<Message>) -> Vec<Message> {
        if history.len() > self.max_messages {
            history.drain(..history.len() - self.max_messages);
        }
        history
    }

    fn history_path(&self, session_key: &str) -> Option<PathBuf> {
        self.persist_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", hex::encode(session_key))))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Message>>> {
        match self.histories.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("session history lock poisoned; recovering state");
                poisoned.into_inner()
            }
        }
    }
}
