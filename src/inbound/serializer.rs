//! Per-key serialization of async operations.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;

type Chains<K> = Arc<Mutex<HashMap<K, Link>>>;

/// Tail of a key's chain: the completion signal of the last scheduled operation.
#[derive(Debug)]
struct Link {
    id: u64,
    done: oneshot::Receiver<()>,
}

/// Runs at most one operation per key at a time, in submission order.
///
/// Each call takes the current tail for its key and installs its own. The
/// operation starts once the previous tail signals completion, which happens
/// when the previous operation finishes, fails, panics or is dropped. A failure
/// therefore never stalls later operations for the same key.
#[derive(Debug)]
pub struct KeyedSerializer<K> {
    chains: Chains<K>,
    next_id: AtomicU64,
}

impl<K> Default for KeyedSerializer<K> {
    fn default() -> Self {
        Self {
            chains: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<K> KeyedSerializer<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `operation` behind every earlier operation for `key`.
    ///
    /// The position in the queue is taken when `run` is called, not when the
    /// returned future is first polled.
    pub fn run<F, Fut, T>(
        &self,
        key: K,
        operation: F,
    ) -> impl Future<Output = T> + Send + use<K, F, Fut, T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let predecessor = lock_chains(&self.chains).insert(
            key.clone(),
            Link {
                id,
                done: done_rx,
            },
        );
        let mut slot = ChainSlot {
            chains: Arc::clone(&self.chains),
            key,
            id,
            waiting_on: predecessor.map(|link| link.done),
            done: Some(done_tx),
        };

        async move {
            if let Some(previous) = slot.waiting_on.as_mut() {
                // Err means the predecessor's sender dropped, which is the
                // completion signal whatever its outcome was.
                let _ = previous.await;
            }
            slot.waiting_on = None;
            let output = operation().await;
            drop(slot);
            output
        }
    }

    /// Number of keys with a scheduled or running operation.
    pub fn active_keys(&self) -> usize {
        lock_chains(&self.chains).len()
    }
}

/// Held for the lifetime of one scheduled operation.
///
/// Dropping it prunes the key if nothing was queued behind, then (by dropping
/// the sender) releases the successor. A slot dropped while still waiting on
/// its predecessor hands both steps to a task that first waits for that
/// predecessor, so a cancelled waiter never lets its successor overtake a
/// running operation.
struct ChainSlot<K: Eq + Hash + Clone + Send + 'static> {
    chains: Chains<K>,
    key: K,
    id: u64,
    waiting_on: Option<oneshot::Receiver<()>>,
    done: Option<oneshot::Sender<()>>,
}

impl<K: Eq + Hash + Clone + Send + 'static> Drop for ChainSlot<K> {
    fn drop(&mut self) {
        let done = self.done.take();
        let Some(predecessor) = self.waiting_on.take() else {
            release(&self.chains, &self.key, self.id, done);
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let chains = Arc::clone(&self.chains);
                let key = self.key.clone();
                let id = self.id;
                handle.spawn(async move {
                    let _ = predecessor.await;
                    release(&chains, &key, id, done);
                });
            }
            Err(_) => {
                tracing::warn!("keyed serializer slot dropped outside a runtime; releasing early");
                release(&self.chains, &self.key, self.id, done);
            }
        }
    }
}

/// Prune `key` if `id` is still its tail, then signal completion.
fn release<K: Eq + Hash>(
    chains: &Mutex<HashMap<K, Link>>,
    key: &K,
    id: u64,
    done: Option<oneshot::Sender<()>>,
) {
    {
        let mut chains = lock_chains(chains);
        if chains.get(key).is_some_and(|link| link.id == id) {
            chains.remove(key);
        }
    }
    drop(done);
}

fn lock_chains<K>(chains: &Mutex<HashMap<K, Link>>) -> MutexGuard<'_, HashMap<K, Link>> {
    match chains.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("keyed serializer lock poisoned; recovering state");
            poisoned.into_inner()
        }
    }
}
