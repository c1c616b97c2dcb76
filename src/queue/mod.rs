//! Deduplicating, rate-limited work queue
//!
//! Discipline:
//! - an item already waiting is not queued twice
//! - an item added while a worker processes it is marked dirty and re-queued
//!   when that worker calls `done`, so no two workers ever hold the same item
//! - after `shut_down`, adds fail with `QueueError::Closed` while `get`
//!   keeps draining what was queued before returning `Closed`

mod backoff;

pub use backoff::ExponentialBackoff;

use crate::errors::QueueError;
use crate::infrastructure::CancellationToken;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

struct QueueState<T> {
    queue: VecDeque<T>,
    /// Items waiting to be processed (queued, or re-queued on `done`)
    dirty: HashSet<T>,
    /// Items handed out by `get` and not yet `done`
    processing: HashSet<T>,
    shutting_down: bool,
}

pub struct DirtyQueue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
    backoff: ExponentialBackoff<T>,
    /// Delayed adds not fired yet
    delayed: AtomicUsize,
    shutdown: CancellationToken,
}

impl<T> DirtyQueue<T>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
            backoff: ExponentialBackoff::new(base_delay, max_delay),
            delayed: AtomicUsize::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn add(&self, item: T) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        if state.shutting_down {
            return Err(QueueError::Closed);
        }
        if !state.dirty.insert(item.clone()) {
            return Ok(());
        }
        if state.processing.contains(&item) {
            return Ok(());
        }
        state.queue.push_back(item);
        drop(state);

        self.notify.notify_one();
        Ok(())
    }

    /// Wait for the next item and mark it as processing
    pub async fn get(&self) -> Result<T, QueueError> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock();
                if let Some(item) = state.queue.pop_front() {
                    state.dirty.remove(&item);
                    state.processing.insert(item.clone());
                    return Ok(item);
                }
                if state.shutting_down {
                    return Err(QueueError::Closed);
                }
            }
            notified.await;
        }
    }

    /// Release an item taken with `get`; re-queues it if it was added meanwhile
    pub fn done(&self, item: &T) {
        let mut state = self.state.lock();
        state.processing.remove(item);
        if state.dirty.contains(item) {
            state.queue.push_back(item.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Add once `delay` has elapsed; dropped if the queue shuts down first
    pub fn add_after(self: &Arc<Self>, item: T, delay: Duration) {
        if delay.is_zero() {
            let _ = self.add(item);
            return;
        }

        self.delayed.fetch_add(1, Ordering::SeqCst);
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = queue.shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = queue.add(item);
                }
            }
            queue.delayed.fetch_sub(1, Ordering::SeqCst);
        });
    }

    /// Re-add after the item's exponential backoff delay
    pub fn add_rate_limited(self: &Arc<Self>, item: T) {
        let delay = self.backoff.when(&item);
        self.add_after(item, delay);
    }

    /// Reset the item's backoff after a successful pass
    pub fn forget(&self, item: &T) {
        self.backoff.forget(item);
    }

    pub fn num_requeues(&self, item: &T) -> u32 {
        self.backoff.num_requeues(item)
    }

    pub fn shut_down(&self) {
        self.state.lock().shutting_down = true;
        self.shutdown.cancel();
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state.lock().shutting_down
    }

    /// Items waiting to be handed out
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nothing queued, nothing processing, no delayed add pending
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.queue.is_empty()
            && state.processing.is_empty()
            && self.delayed.load(Ordering::SeqCst) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> Arc<DirtyQueue<&'static str>> {
        Arc::new(DirtyQueue::new(Duration::from_millis(1), Duration::from_millis(50)))
    }

    #[tokio::test]
    async fn test_add_deduplicates() {
        let q = queue();
        q.add("a").unwrap();
        q.add("a").unwrap();
        q.add("b").unwrap();
        assert_eq!(q.len(), 2);

        assert_eq!(q.get().await.unwrap(), "a");
        assert_eq!(q.get().await.unwrap(), "b");
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_add_while_processing_requeues_on_done() {
        let q = queue();
        q.add("a").unwrap();

        let item = q.get().await.unwrap();
        q.add("a").unwrap();
        // not handed out a second time while in flight
        assert_eq!(q.len(), 0);

        q.done(&item);
        assert_eq!(q.len(), 1);
        assert_eq!(q.get().await.unwrap(), "a");
        q.done(&"a");
        assert!(q.is_idle());
    }

    #[tokio::test]
    async fn test_get_waits_for_add() {
        let q = queue();
        let q2 = q.clone();
        let waiter = tokio::spawn(async move { q2.get().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        q.add("late").unwrap();

        assert_eq!(waiter.await.unwrap().unwrap(), "late");
    }

    #[tokio::test]
    async fn test_shutdown_drains_then_closes() {
        let q = queue();
        q.add("a").unwrap();
        q.shut_down();

        assert_eq!(q.add("b"), Err(QueueError::Closed));
        assert_eq!(q.get().await.unwrap(), "a");
        assert_eq!(q.get().await, Err(QueueError::Closed));
        assert!(q.is_shutting_down());
    }

    #[tokio::test]
    async fn test_shutdown_wakes_waiters() {
        let q = queue();
        let q2 = q.clone();
        let waiter = tokio::spawn(async move { q2.get().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        q.shut_down();

        assert_eq!(waiter.await.unwrap(), Err(QueueError::Closed));
    }

    #[tokio::test]
    async fn test_rate_limited_add_is_delayed() {
        let q = queue();
        q.add_rate_limited("a");
        assert_eq!(q.num_requeues(&"a"), 1);
        assert!(!q.is_idle());

        let item = tokio::time::timeout(Duration::from_secs(1), q.get()).await.unwrap().unwrap();
        assert_eq!(item, "a");
        q.done(&item);
        q.forget(&item);
        assert_eq!(q.num_requeues(&"a"), 0);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_delayed_adds() {
        let q = queue();
        q.add_after("a", Duration::from_secs(60));
        q.shut_down();

        tokio::time::timeout(Duration::from_secs(1), async {
            while !q.is_idle() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(q.len(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_workers_never_share_an_item() {
        let q: Arc<DirtyQueue<u32>> =
            Arc::new(DirtyQueue::new(Duration::from_millis(1), Duration::from_millis(10)));
        let in_flight = Arc::new(Mutex::new(HashSet::new()));

        let mut workers = Vec::new();
        for _ in 0..4 {
            let q = q.clone();
            let in_flight = in_flight.clone();
            workers.push(tokio::spawn(async move {
                while let Ok(item) = q.get().await {
                    assert!(in_flight.lock().insert(item), "item {} handed out twice", item);
                    tokio::task::yield_now().await;
                    in_flight.lock().remove(&item);
                    q.done(&item);
                }
            }));
        }

        for round in 0..50 {
            for item in 0..8 {
                q.add(item).unwrap();
            }
            if round % 10 == 0 {
                tokio::task::yield_now().await;
            }
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            while !q.is_idle() {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();

        q.shut_down();
        for worker in workers {
            worker.await.unwrap();
        }
    }
}
