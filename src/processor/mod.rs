//! Per-item GC decisions
//!
//! A worker takes one identity from the `DirtyQueue`, reads its node from the
//! `ObjectGraph` and issues at most one kind of store mutation:
//!
//! - ordinary objects whose owners are all absent are deleted, synchronously
//!   when an owner is itself collecting garbage
//! - ordinary objects with a solid owner drop references to owners that are
//!   dangling or collecting
//! - collecting owners lose `CollectingGarbage` once no live blocking
//!   dependent remains (or a cycle is detected)
//! - orphaning owners strip their dependents' references, then lose `orphan`
//!
//! The graph is never locked across a store call.

pub mod cycle;

pub use cycle::CycleVerdict;

use crate::errors::{GcError, QueueError, StoreError};
use crate::graph::{GraphNode, ObjectGraph};
use crate::infrastructure::metrics::{
    CYCLES_BROKEN, DELETES_ISSUED, FINALIZERS_REMOVED, OWNER_REFS_REMOVED, PROCESS_ITEM, RETRIES,
};
use crate::infrastructure::{CancellationToken, GcMetrics, Timer};
use crate::object::{DeleteOptions, Finalizer, ObjectIdentity};
use crate::queue::DirtyQueue;
use crate::store::ObjectStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// What one processing pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Node unknown or already deleted
    Dropped,
    /// Re-queued with backoff until the object's controller catches up
    Requeued,
    NoAction,
    Deleted { synchronous: bool },
    OwnerReferencesRemoved(Vec<ObjectIdentity>),
    FinalizerRemoved(Finalizer),
    CycleBroken,
    /// Blocking dependents still present; they were enqueued
    WaitingOnDependents(usize),
    /// Dependents released before the `orphan` finalizer was removed
    Orphaned(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OwnerState {
    Solid,
    Dangling,
    Deleting { collecting: bool },
}

pub struct ItemProcessor {
    graph: Arc<ObjectGraph>,
    queue: Arc<DirtyQueue<ObjectIdentity>>,
    store: Arc<dyn ObjectStore>,
    metrics: Arc<GcMetrics>,
    store_timeout: Duration,
    token: CancellationToken,
}

impl ItemProcessor {
    pub fn new(
        graph: Arc<ObjectGraph>,
        queue: Arc<DirtyQueue<ObjectIdentity>>,
        store: Arc<dyn ObjectStore>,
        metrics: Arc<GcMetrics>,
        store_timeout: Duration,
        token: CancellationToken,
    ) -> Self {
        Self {
            graph,
            queue,
            store,
            metrics,
            store_timeout,
            token,
        }
    }

    /// Worker loop: process items until the queue is shut down and drained
    pub async fn run(&self) {
        while self.process_next().await.is_ok() {}
        debug!("worker stopped");
    }

    /// Take one item, process it and settle its queue state
    pub async fn process_next(&self) -> Result<(), QueueError> {
        let id = self.queue.get().await?;

        let result = {
            let _timer = Timer::new(&self.metrics, PROCESS_ITEM);
            self.process(&id).await
        };

        match result {
            Ok(Action::Requeued) => {}
            Ok(action) => {
                debug!(object = %id, ?action, "processed");
                self.queue.forget(&id);
            }
            Err(err) if err.is_conflict() => {
                debug!(object = %id, %err, "conflict, re-queueing");
                if let Err(closed) = self.queue.add(id.clone()) {
                    debug!(object = %id, %closed, "work queue closed, conflict not re-queued");
                }
            }
            Err(err) if err.is_shutdown() => {
                debug!(object = %id, "abandoned on shutdown");
            }
            Err(GcError::Graph(err)) => {
                error!(object = %id, %err, "graph invariant violated, dropping item");
                self.queue.forget(&id);
            }
            Err(err) => {
                warn!(object = %id, %err, retries = self.queue.num_requeues(&id), "processing failed, retrying");
                self.metrics.increment(RETRIES);
                self.queue.add_rate_limited(id.clone());
            }
        }

        self.queue.done(&id);
        Ok(())
    }

    /// Decide and act on one identity
    #[instrument(skip_all, fields(object = %id))]
    pub async fn process(&self, id: &ObjectIdentity) -> Result<Action, GcError> {
        let Some(node) = self.graph.node(id) else {
            return Ok(Action::Dropped);
        };
        if node.deletion_observed {
            return Ok(Action::Dropped);
        }
        if node.is_virtual {
            return Ok(Action::NoAction);
        }
        if node.generation_lagging() {
            debug!(generation = node.generation, observed = ?node.observed_generation, "generation not observed yet");
            self.queue.add_rate_limited(id.clone());
            return Ok(Action::Requeued);
        }

        if node.gc_in_progress {
            self.process_collecting(&node).await
        } else if node.orphan_in_progress {
            self.process_orphaning(&node).await
        } else {
            self.process_ordinary(&node).await
        }
    }

    async fn process_ordinary(&self, node: &GraphNode) -> Result<Action, GcError> {
        if node.owners.is_empty() {
            return Ok(Action::NoAction);
        }

        let mut solid = 0;
        let mut stale = Vec::new();
        let mut collecting_owner = false;
        for owner in node.owners.keys() {
            match self.classify_owner(owner).await? {
                OwnerState::Solid => solid += 1,
                OwnerState::Dangling => stale.push(owner.clone()),
                OwnerState::Deleting { collecting } => {
                    if collecting {
                        collecting_owner = true;
                        stale.push(owner.clone());
                    }
                }
            }
        }

        if solid == 0 {
            if node.deletion_requested {
                return Ok(Action::NoAction);
            }
            let options = if collecting_owner {
                DeleteOptions::synchronous()
            } else {
                DeleteOptions::background()
            };
            info!(object = %node.identity, synchronous = collecting_owner, "all owners absent, deleting");
            self.mutate(self.store.delete(&node.identity, options)).await?;
            self.metrics.increment(DELETES_ISSUED);
            return Ok(Action::Deleted { synchronous: collecting_owner });
        }

        if stale.is_empty() {
            return Ok(Action::NoAction);
        }
        info!(object = %node.identity, owners = stale.len(), "removing references to absent owners");
        self.mutate(self.store.remove_owner_references(&node.identity, &stale))
            .await?;
        self.metrics.add(OWNER_REFS_REMOVED, stale.len() as u64);
        Ok(Action::OwnerReferencesRemoved(stale))
    }

    async fn process_collecting(&self, node: &GraphNode) -> Result<Action, GcError> {
        let id = &node.identity;

        if cycle::check(&self.graph, id) == CycleVerdict::Cycle {
            warn!(object = %id, "every owner is collecting garbage, breaking ownership cycle");
            self.mutate(self.store.remove_finalizer(id, Finalizer::CollectingGarbage))
                .await?;
            self.metrics.increment(CYCLES_BROKEN);
            return Ok(Action::CycleBroken);
        }

        let blocking = self.graph.blocking_dependents(id);
        if blocking.is_empty() {
            info!(object = %id, "no blocking dependents left, removing finalizer");
            self.mutate(self.store.remove_finalizer(id, Finalizer::CollectingGarbage))
                .await?;
            self.metrics.increment(FINALIZERS_REMOVED);
            return Ok(Action::FinalizerRemoved(Finalizer::CollectingGarbage));
        }

        debug!(object = %id, blocking = blocking.len(), "waiting on blocking dependents");
        let waiting = blocking.len();
        for dependent in blocking {
            self.queue.add(dependent)?;
        }
        Ok(Action::WaitingOnDependents(waiting))
    }

    async fn process_orphaning(&self, node: &GraphNode) -> Result<Action, GcError> {
        let id = &node.identity;
        let dependents = self.graph.dependents_of(id);

        for dependent in &dependents {
            self.mutate(
                self.store
                    .remove_owner_references(dependent, std::slice::from_ref(id)),
            )
            .await?;
        }
        self.metrics.add(OWNER_REFS_REMOVED, dependents.len() as u64);

        info!(object = %id, dependents = dependents.len(), "dependents orphaned, removing finalizer");
        self.mutate(self.store.remove_finalizer(id, Finalizer::OrphanDependents))
            .await?;
        self.metrics.increment(FINALIZERS_REMOVED);
        Ok(Action::Orphaned(dependents.len()))
    }

    async fn classify_owner(&self, owner: &ObjectIdentity) -> Result<OwnerState, GcError> {
        let state = match self.graph.node(owner) {
            None => OwnerState::Dangling,
            Some(node) if node.deletion_observed => OwnerState::Dangling,
            Some(node) if node.is_virtual => self.verify_virtual_owner(owner).await?,
            Some(node) if node.is_absent_owner() => OwnerState::Deleting {
                collecting: node.gc_in_progress,
            },
            Some(_) => OwnerState::Solid,
        };
        Ok(state)
    }

    /// Ask the store whether an owner only known by reference exists
    async fn verify_virtual_owner(&self, owner: &ObjectIdentity) -> Result<OwnerState, GcError> {
        match self.call(self.store.get(owner)).await {
            Ok(snapshot) if snapshot.identity.uid != owner.uid => {
                debug!(owner = %owner, found = %snapshot.identity.uid, "owner uid mismatch");
                Ok(OwnerState::Dangling)
            }
            Ok(snapshot) if snapshot.is_deleting() && !snapshot.is_orphaning() => Ok(OwnerState::Deleting {
                collecting: snapshot.is_collecting_garbage(),
            }),
            Ok(_) => Ok(OwnerState::Solid),
            Err(err) if err.is_not_found() => {
                debug!(owner = %owner, "virtual owner does not exist");
                Ok(OwnerState::Dangling)
            }
            Err(err) => Err(err),
        }
    }

    /// Store mutation; the object being gone already counts as done
    async fn mutate<F>(&self, request: F) -> Result<(), GcError>
    where
        F: Future<Output = Result<(), StoreError>>,
    {
        match self.call(request).await {
            Err(err) if err.is_not_found() => Ok(()),
            other => other,
        }
    }

    /// Bounded by the store timeout and abandoned on cancellation
    async fn call<T, F>(&self, request: F) -> Result<T, GcError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::select! {
            _ = self.token.cancelled() => Err(GcError::Cancelled),
            result = tokio::time::timeout(self.store_timeout, request) => match result {
                Ok(answer) => answer.map_err(GcError::from),
                Err(_) => Err(StoreError::Timeout(self.store_timeout).into()),
            },
        }
    }
}
