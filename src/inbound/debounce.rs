//! Trailing debounce of inbound items, batched per key.
//!
//! A single worker task owns every pending batch. Each item for a key pushes
//! that key's deadline out by the debounce window; when a deadline passes, the
//! whole batch is removed and handed to the flush handler on its own task, so a
//! slow flush for one key never delays the timers of another.

use futures::FutureExt as _;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

type KeyFn<T, K> = Arc<dyn Fn(&T) -> Option<K> + Send + Sync>;
type FlushFn<K, T> = Arc<dyn Fn(K, Vec<T>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type ErrorFn<K> = Arc<dyn Fn(&K, &anyhow::Error) + Send + Sync>;

/// Used when no batch is pending; any item arriving wakes the worker first.
const IDLE_SLEEP: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    /// Quiet period after the last item before a batch flushes.
    pub window: Duration,
    /// A batch reaching this many items flushes immediately.
    pub max_batch_items: usize,
}

impl DebounceConfig {
    pub fn new(window: Duration, max_batch_items: usize) -> Self {
        Self {
            window,
            max_batch_items: max_batch_items.max(1),
        }
    }
}

struct PendingBatch<T> {
    items: Vec<T>,
    deadline: Instant,
}

/// Per-key trailing debouncer.
///
/// Items without a key are dropped: there is nothing to group or deduplicate
/// them by. The debouncer does no serialization of its own; flush handlers
/// for the same key may overlap if a flush outlives the next quiet period.
pub struct Debouncer<K, T> {
    key_fn: KeyFn<T, K>,
    tx: mpsc::UnboundedSender<(K, T)>,
    worker: JoinHandle<()>,
}

impl<K, T> Debouncer<K, T>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    T: Send + 'static,
{
    /// Start the worker task. Must be called within a tokio runtime.
    ///
    /// `on_error` receives every error returned by `flush`; the failed batch
    /// is not retried and the key starts fresh on its next item.
    pub fn spawn<KF, FF, Fut, EF>(config: DebounceConfig, key_fn: KF, flush: FF, on_error: EF) -> Self
    where
        KF: Fn(&T) -> Option<K> + Send + Sync + 'static,
        FF: Fn(K, Vec<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
        EF: Fn(&K, &anyhow::Error) + Send + Sync + 'static,
    {
        let flush: FlushFn<K, T> = Arc::new(move |key, items| flush(key, items).boxed());
        let on_error: ErrorFn<K> = Arc::new(on_error);
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(config, rx, flush, on_error));

        Self {
            key_fn: Arc::new(key_fn),
            tx,
            worker,
        }
    }

    /// Add an item to its key's pending batch and restart that key's timer.
    ///
    /// Returns `false` if the item had no key or the debouncer is shut down.
    pub fn enqueue(&self, item: T) -> bool {
        let Some(key) = (self.key_fn)(&item) else {
            tracing::debug!("dropping inbound item without a grouping key");
            return false;
        };
        if self.tx.send((key, item)).is_err() {
            tracing::warn!("debouncer worker is gone; dropping inbound item");
            return false;
        }
        true
    }

    /// Flush every pending batch now and wait for all flushes to finish.
    pub async fn shutdown(self) {
        let Self { tx, worker, .. } = self;
        drop(tx);
        if let Err(error) = worker.await {
            tracing::error!(%error, "debouncer worker failed");
        }
    }
}

async fn run_worker<K, T>(
    config: DebounceConfig,
    mut rx: mpsc::UnboundedReceiver<(K, T)>,
    flush: FlushFn<K, T>,
    on_error: ErrorFn<K>,
) where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    T: Send + 'static,
{
    let mut pending: HashMap<K, PendingBatch<T>> = HashMap::new();
    let mut in_flight = JoinSet::new();

    loop {
        let next_deadline = pending.values().map(|batch| batch.deadline).min();
        let wake_at = next_deadline.unwrap_or_else(|| Instant::now() + IDLE_SLEEP);

        tokio::select! {
            received = rx.recv() => {
                let Some((key, item)) = received else {
                    break;
                };
                let deadline = Instant::now() + config.window;
                let batch = pending.entry(key.clone()).or_insert_with(|| PendingBatch {
                    items: Vec::new(),
                    deadline,
                });
                batch.items.push(item);
                batch.deadline = deadline;

                if batch.items.len() >= config.max_batch_items
                    && let Some(batch) = pending.remove(&key)
                {
                    tracing::debug!(ingestion_key = ?key, batch_size = batch.items.len(), "batch cap reached; flushing early");
                    start_flush(&mut in_flight, &flush, &on_error, key, batch.items);
                }
            }
            _ = tokio::time::sleep_until(wake_at), if next_deadline.is_some() => {
                let now = Instant::now();
                let due: Vec<K> = pending
                    .iter()
                    .filter(|(_, batch)| batch.deadline <= now)
                    .map(|(key, _)| key.clone())
                    .collect();
                for key in due {
                    if let Some(batch) = pending.remove(&key) {
                        start_flush(&mut in_flight, &flush, &on_error, key, batch.items);
                    }
                }
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(error) = joined {
                    tracing::error!(%error, "flush task panicked");
                }
            }
        }
    }

    // Flush whatever is still pending before shutting down.
    for (key, batch) in pending.drain() {
        start_flush(&mut in_flight, &flush, &on_error, key, batch.items);
    }
    while let Some(joined) = in_flight.join_next().await {
        if let Err(error) = joined {
            tracing::error!(%error, "flush task panicked");
        }
    }
}

fn start_flush<K, T>(
    in_flight: &mut JoinSet<()>,
    flush: &FlushFn<K, T>,
    on_error: &ErrorFn<K>,
    key: K,
    items: Vec<T>,
) where
    K: Clone + Debug + Send + Sync + 'static,
    T: Send + 'static,
{
    tracing::debug!(ingestion_key = ?key, batch_size = items.len(), "flushing batch");
    let flush = Arc::clone(flush);
    let on_error = Arc::clone(on_error);
    in_flight.spawn(async move {
        if let Err(error) = flush(key.clone(), items).await {
            tracing::warn!(ingestion_key = ?key, %error, "flush handler failed");
            on_error(&key, &error);
        }
    });
}
