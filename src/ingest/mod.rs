//! Watch-event ingestion
//!
//! Applies Added/Modified/Deleted snapshots to the `ObjectGraph` and
//! enqueues every identity whose GC decision may have changed. Ingestion
//! never waits on processing: enqueueing is a non-blocking set insert.

use crate::errors::{GraphError, QueueError};
use crate::graph::ObjectGraph;
use crate::infrastructure::metrics::{EVENTS_DROPPED, EVENTS_INGESTED};
use crate::infrastructure::{CancellationToken, GcMetrics};
use crate::object::{EventType, ObjectIdentity, ObjectSnapshot, OwnerReference, WatchEvent};
use crate::queue::DirtyQueue;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Decides whether a dependent may block its owner's synchronous deletion
///
/// A dependent whose creator lacks delete permission on the owner must not
/// hold the owner hostage; its reference is downgraded to non-blocking.
pub trait BlockingAuthorizer: Send + Sync {
    fn may_block(&self, dependent: &ObjectIdentity, owner: &ObjectIdentity) -> bool;
}

/// Permits every blocking reference
pub struct AllowAll;

impl BlockingAuthorizer for AllowAll {
    fn may_block(&self, _dependent: &ObjectIdentity, _owner: &ObjectIdentity) -> bool {
        true
    }
}

pub struct EventIngestor {
    graph: Arc<ObjectGraph>,
    queue: Arc<DirtyQueue<ObjectIdentity>>,
    metrics: Arc<GcMetrics>,
    authorizer: Arc<dyn BlockingAuthorizer>,
}

impl EventIngestor {
    pub fn new(
        graph: Arc<ObjectGraph>,
        queue: Arc<DirtyQueue<ObjectIdentity>>,
        metrics: Arc<GcMetrics>,
    ) -> Self {
        Self {
            graph,
            queue,
            metrics,
            authorizer: Arc::new(AllowAll),
        }
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn BlockingAuthorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    /// Consume `events` until the stream ends, the queue closes or `token`
    /// is cancelled
    pub async fn run<S>(&self, events: S, token: CancellationToken)
    where
        S: Stream<Item = WatchEvent> + Send,
    {
        futures::pin_mut!(events);
        loop {
            let event = tokio::select! {
                _ = token.cancelled() => break,
                event = events.next() => event,
            };
            let Some(event) = event else {
                info!("watch stream closed");
                break;
            };
            if let Err(QueueError::Closed) = self.ingest(event) {
                debug!("work queue closed, stopping ingestion");
                break;
            }
        }
    }

    /// Apply one event to the graph
    pub fn ingest(&self, event: WatchEvent) -> Result<(), QueueError> {
        let WatchEvent { event_type, object } = event;
        if !object.identity.is_well_formed() {
            warn!(object = ?object.identity, "dropping event for malformed snapshot");
            self.metrics.increment(EVENTS_DROPPED);
            return Ok(());
        }
        self.metrics.increment(EVENTS_INGESTED);

        match event_type {
            EventType::Added | EventType::Modified => self.apply_snapshot(object),
            EventType::Deleted => self.apply_deletion(&object.identity),
        }
    }

    fn apply_snapshot(&self, object: ObjectSnapshot) -> Result<(), QueueError> {
        let id = &object.identity;
        let owners = self.authorized_owners(&object);

        match self.graph.upsert(id, &owners, object.generation, object.observed_generation) {
            Ok(outcome) => {
                if outcome.topology_changed() {
                    debug!(object = %id, added = outcome.added_owners.len(), removed = outcome.removed_owners.len(), "owner topology changed");
                    self.queue.add(id.clone())?;
                }
                // a dropped or downgraded reference may have been the owner's last blocker
                for owner in outcome.removed_owners.iter().chain(&outcome.blocking_changed_owners) {
                    if self.graph.node(owner).map_or(false, |n| n.gc_in_progress) {
                        self.queue.add(owner.clone())?;
                    }
                }
            }
            Err(err @ GraphError::Conflict { .. }) => {
                debug!(%err, "stale snapshot, re-evaluating");
                return self.queue.add(id.clone());
            }
            Err(err) => {
                error!(%err, "graph rejected snapshot");
                return Ok(());
            }
        }

        if object.is_deleting() {
            let first_request = self.graph.node(id).map_or(false, |n| !n.deletion_requested);
            self.graph.mark_deletion_requested(id);
            // dependents see a deleting owner as absent
            if first_request {
                for dependent in self.graph.dependents_of(id) {
                    self.queue.add(dependent)?;
                }
            }
        }

        let collecting = object.is_collecting_garbage();
        self.graph.mark_gc_in_progress(id, collecting);
        if collecting {
            self.queue.add(id.clone())?;
        }

        let orphaning = object.is_orphaning();
        self.graph.mark_orphan_in_progress(id, orphaning);
        if orphaning {
            self.queue.add(id.clone())?;
        }

        Ok(())
    }

    fn apply_deletion(&self, id: &ObjectIdentity) -> Result<(), QueueError> {
        let Some(outcome) = self.graph.observe_deletion(id) else {
            debug!(object = %id, "deletion of untracked object");
            return Ok(());
        };
        debug!(object = %id, removed = outcome.removed, dependents = outcome.dependents.len(), "observed deletion");

        for (owner, collecting) in outcome.owners {
            if collecting {
                self.queue.add(owner)?;
            }
        }
        // their owner is now absent
        for dependent in outcome.dependents {
            self.queue.add(dependent)?;
        }
        Ok(())
    }

    fn authorized_owners(&self, object: &ObjectSnapshot) -> Vec<OwnerReference> {
        object
            .owner_references
            .iter()
            .map(|reference| {
                if reference.blocking && !self.authorizer.may_block(&object.identity, &reference.owner) {
                    warn!(
                        dependent = %object.identity,
                        owner = %reference.owner,
                        "dependent may not block owner deletion, treating reference as non-blocking"
                    );
                    OwnerReference::non_blocking(reference.owner.clone())
                } else {
                    reference.clone()
                }
            })
            .collect()
    }
}
