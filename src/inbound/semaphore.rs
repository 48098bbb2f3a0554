//! Admission control for agent turns.

use crate::error::AgentError;

use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting gate bounding how many turns run at once.
///
/// Waiters are served strictly in arrival order. Permits are released when the
/// [`TurnPermit`] drops, so every exit path (including errors and panics
/// unwinding through the holder) gives the slot back.
#[derive(Debug, Clone)]
pub struct TurnSemaphore {
    permits: Arc<Semaphore>,
}

/// A held turn slot.
#[derive(Debug)]
pub struct TurnPermit {
    _permit: OwnedSemaphorePermit,
}

impl TurnSemaphore {
    /// Create a semaphore. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity.max(1))),
        }
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<TurnPermit, AgentError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| AgentError::Closed("turn semaphore"))?;
        Ok(TurnPermit { _permit: permit })
    }

    /// Add one slot without a matching acquire.
    ///
    /// Hands the slot to the longest waiter if there is one, otherwise grows
    /// the available capacity.
    pub fn release(&self) {
        self.permits.add_permits(1);
    }

    /// Run `operation` while holding a slot.
    pub async fn run<F, Fut, T>(&self, operation: F) -> Result<T, AgentError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = self.acquire().await?;
        Ok(operation().await)
    }

    /// Stop admitting turns. Pending and future acquires fail with `Closed`.
    pub fn close(&self) {
        self.permits.close();
    }
}
