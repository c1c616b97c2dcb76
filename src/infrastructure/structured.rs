//! Structured concurrency primitives
//!
//! Scoped tasks and cancellation propagation for the collector's ingestion
//! and worker tasks. All spawned tasks are joined (or aborted) with the scope.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Scoped task group - tasks still running when the scope drops are aborted
pub struct TaskScope {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskScope {
    pub fn new() -> Self {
        Self {
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn task in scope
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);
        self.handles.lock().push(handle);
    }

    /// Wait for all tasks to complete
    pub async fn join_all(&self) {
        let handles = {
            let mut h = self.handles.lock();
            std::mem::take(&mut *h)
        };

        for handle in handles {
            let _ = handle.await;
        }
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }
}

impl Default for TaskScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskScope {
    fn drop(&mut self) {
        for handle in self.handles.lock().iter() {
            handle.abort();
        }
    }
}

/// Cancellation token for coordinated shutdown
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Cancel the token
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Check if cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait for cancellation
    pub async fn cancelled(&self) {
        loop {
            // register before checking so a concurrent cancel is not missed
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_task_scope() {
        let counter = Arc::new(AtomicUsize::new(0));
        let scope = TaskScope::new();

        for _ in 0..10 {
            let counter = counter.clone();
            scope.spawn(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(scope.len(), 10);
        scope.join_all().await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert!(scope.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation() {
        let token = CancellationToken::new();
        let token_clone = token.clone();

        tokio::spawn(async move {
            tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
            token_clone.cancel();
        });

        token.cancelled().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_returns_after_cancel() {
        let token = CancellationToken::new();
        token.cancel();
        // must not wait for a notification that already happened
        token.cancelled().await;
        assert!(token.clone().is_cancelled());
    }
}
