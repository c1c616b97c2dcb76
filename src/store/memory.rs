use super::ObjectStore;
use crate::errors::StoreError;
use crate::object::{DeleteOptions, Finalizer, ObjectIdentity, ObjectSnapshot, WatchEvent};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use flume::{Receiver, Sender};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;

/// One request received by a `MemoryStore`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Get(ObjectIdentity),
    Delete(ObjectIdentity, DeleteOptions),
    RemoveFinalizer(ObjectIdentity, Finalizer),
    RemoveOwnerReferences(ObjectIdentity, Vec<ObjectIdentity>),
}

/// In-memory store with API-server finalizer semantics
///
/// - a delete marks the object with a deletion timestamp (and the
///   `CollectingGarbage` or `orphan` finalizer if requested); objects
///   without finalizers disappear immediately
/// - removing the last finalizer of a deleting object removes it, whether
///   through `remove_finalizer` or a client update
/// - every mutation bumps the resource version and is broadcast to watchers
///
/// Events for one object are emitted while its entry is locked, so each
/// watcher sees them in mutation order.
pub struct MemoryStore {
    objects: DashMap<ObjectIdentity, ObjectSnapshot>,
    watchers: Mutex<Vec<Sender<WatchEvent>>>,
    resource_version: AtomicU64,
    faults: Mutex<VecDeque<StoreError>>,
    calls: Mutex<Vec<StoreCall>>,
    latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            objects: DashMap::new(),
            watchers: Mutex::new(Vec::new()),
            resource_version: AtomicU64::new(0),
            faults: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            latency: None,
        }
    }

    /// Delay every request by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Subscribe to changes; objects present now are replayed as `Added`
    ///
    /// The subscriber is registered before the replay, so a concurrent write
    /// may arrive twice but is never missed. Replayed state is never older
    /// than an event already delivered for the same object.
    pub fn watch(&self) -> Receiver<WatchEvent> {
        let (tx, rx) = flume::unbounded();
        self.watchers.lock().push(tx.clone());
        for entry in self.objects.iter() {
            let _ = tx.send(WatchEvent::added(entry.value().clone()));
        }
        rx
    }

    /// Create or replace an object, as a client write would
    ///
    /// Replacing a deleting object with one that has no finalizers left
    /// removes it.
    pub fn apply(&self, mut snapshot: ObjectSnapshot) -> ObjectSnapshot {
        match self.objects.entry(snapshot.identity.clone()) {
            Entry::Occupied(mut entry) => {
                *entry.get_mut() = snapshot;
                self.commit(entry)
            }
            Entry::Vacant(entry) => {
                snapshot.resource_version = self.next_version();
                let stored = entry.insert(snapshot.clone());
                self.emit(WatchEvent::added(snapshot.clone()));
                drop(stored);
                snapshot
            }
        }
    }

    pub fn object(&self, identity: &ObjectIdentity) -> Option<ObjectSnapshot> {
        self.objects.get(identity).map(|o| o.clone())
    }

    pub fn contains(&self, identity: &ObjectIdentity) -> bool {
        self.objects.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// The next request fails with `error` (queued faults apply in order)
    pub fn inject_fault(&self, error: StoreError) {
        self.faults.lock().push_back(error);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn next_version(&self) -> u64 {
        self.resource_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn emit(&self, event: WatchEvent) {
        trace!(event = ?event.event_type, object = %event.object.identity, "store event");
        self.watchers.lock().retain(|tx| tx.send(event.clone()).is_ok());
    }

    async fn begin(&self, call: StoreCall) -> Result<(), StoreError> {
        self.calls.lock().push(call);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match self.faults.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Store a mutated object, or drop it once deleting without finalizers
    fn commit(
        &self,
        mut entry: dashmap::mapref::entry::OccupiedEntry<'_, ObjectIdentity, ObjectSnapshot>,
    ) -> ObjectSnapshot {
        let snapshot = entry.get_mut();
        snapshot.resource_version = self.next_version();
        let committed = snapshot.clone();
        if committed.is_deleting() && committed.finalizers.is_empty() {
            self.emit(WatchEvent::deleted(committed.clone()));
            entry.remove();
        } else {
            self.emit(WatchEvent::modified(committed.clone()));
        }
        committed
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, identity: &ObjectIdentity) -> Result<ObjectSnapshot, StoreError> {
        self.begin(StoreCall::Get(identity.clone())).await?;
        self.object(identity).ok_or(StoreError::NotFound)
    }

    async fn delete(&self, identity: &ObjectIdentity, options: DeleteOptions) -> Result<(), StoreError> {
        self.begin(StoreCall::Delete(identity.clone(), options)).await?;

        let Entry::Occupied(mut entry) = self.objects.entry(identity.clone()) else {
            return Err(StoreError::NotFound);
        };
        let snapshot = entry.get_mut();
        if snapshot.is_deleting() {
            return Ok(());
        }
        if options.synchronous_gc {
            snapshot.add_finalizer(Finalizer::COLLECTING_GARBAGE);
        } else if options.orphan_dependents {
            snapshot.add_finalizer(Finalizer::ORPHAN);
        }
        snapshot.deletion_timestamp = Some(Utc::now());
        self.commit(entry);
        Ok(())
    }

    async fn remove_finalizer(&self, identity: &ObjectIdentity, finalizer: Finalizer) -> Result<(), StoreError> {
        self.begin(StoreCall::RemoveFinalizer(identity.clone(), finalizer)).await?;

        let Entry::Occupied(mut entry) = self.objects.entry(identity.clone()) else {
            return Err(StoreError::NotFound);
        };
        if entry.get_mut().remove_finalizer(finalizer.name()) {
            self.commit(entry);
        }
        Ok(())
    }

    async fn remove_owner_references(
        &self,
        identity: &ObjectIdentity,
        owners: &[ObjectIdentity],
    ) -> Result<(), StoreError> {
        self.begin(StoreCall::RemoveOwnerReferences(identity.clone(), owners.to_vec()))
            .await?;

        let Entry::Occupied(mut entry) = self.objects.entry(identity.clone()) else {
            return Err(StoreError::NotFound);
        };
        let snapshot = entry.get_mut();
        let before = snapshot.owner_references.len();
        snapshot.owner_references.retain(|r| !owners.contains(&r.owner));
        if snapshot.owner_references.len() != before {
            self.commit(entry);
        }
        Ok(())
    }
}
