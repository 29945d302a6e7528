use std::{future::Future, sync::Arc};

use tokio::sync::Semaphore;

/// A scheduling gate that lets at most `n` tasks run at once.
///
/// Waiters are admitted in FIFO order since tokio's [`Semaphore`] is fair.
/// Permits are released on drop, so a task that errors or panics frees its
/// slot for whoever is queued next.
#[derive(Debug, Clone)]
pub struct Limiter {
    permits: Arc<Semaphore>,
}

impl Limiter {
    /// Creates a gate admitting `n` concurrent tasks. `0` is treated as `1`.
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(n.max(1))),
        }
    }

    /// Waits for a free slot, then drives `task` to completion while holding it
    pub async fn run<F>(&self, task: F) -> F::Output
    where
        F: Future,
    {
        // The semaphore is owned here and never closed, so acquiring can't fail
        let _permit = self.permits.acquire().await.ok();
        task.await
    }
}
