use super::{ObjectIdentity, OwnerReference};
use crate::errors::GcError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Finalizers the collector acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Finalizer {
    /// Owner waits for its blocking dependents (synchronous GC)
    CollectingGarbage,
    /// Owner waits until its dependents no longer reference it
    OrphanDependents,
}

impl Finalizer {
    pub const COLLECTING_GARBAGE: &'static str = "CollectingGarbage";
    pub const ORPHAN: &'static str = "orphan";

    pub fn name(&self) -> &'static str {
        match self {
            Self::CollectingGarbage => Self::COLLECTING_GARBAGE,
            Self::OrphanDependents => Self::ORPHAN,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            Self::COLLECTING_GARBAGE => Some(Self::CollectingGarbage),
            Self::ORPHAN => Some(Self::OrphanDependents),
            _ => None,
        }
    }
}

/// Full object state as delivered by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSnapshot {
    pub identity: ObjectIdentity,
    #[serde(default)]
    pub owner_references: Vec<OwnerReference>,
    /// Finalizer names; unknown ones are carried untouched
    #[serde(default)]
    pub finalizers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub generation: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub resource_version: u64,
}

impl ObjectSnapshot {
    pub fn new(identity: ObjectIdentity) -> Self {
        Self {
            identity,
            owner_references: Vec::new(),
            finalizers: Vec::new(),
            deletion_timestamp: None,
            generation: 1,
            observed_generation: None,
            resource_version: 0,
        }
    }

    pub fn with_owner(mut self, owner: OwnerReference) -> Self {
        self.owner_references.push(owner);
        self
    }

    pub fn with_finalizer(mut self, finalizer: Finalizer) -> Self {
        self.add_finalizer(finalizer.name());
        self
    }

    pub fn with_deletion_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.deletion_timestamp = Some(at);
        self
    }

    pub fn with_generation(mut self, generation: i64) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_observed_generation(mut self, observed: i64) -> Self {
        self.observed_generation = Some(observed);
        self
    }

    pub fn has_finalizer(&self, finalizer: Finalizer) -> bool {
        self.finalizers.iter().any(|f| f == finalizer.name())
    }

    /// Returns false when the finalizer was already present
    pub fn add_finalizer(&mut self, name: &str) -> bool {
        if self.finalizers.iter().any(|f| f == name) {
            return false;
        }
        self.finalizers.push(name.to_string());
        true
    }

    /// Returns false when the finalizer was not present
    pub fn remove_finalizer(&mut self, name: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != name);
        self.finalizers.len() != before
    }

    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// Deleting and waiting on blocking dependents
    pub fn is_collecting_garbage(&self) -> bool {
        self.is_deleting() && self.has_finalizer(Finalizer::CollectingGarbage)
    }

    /// Deleting and waiting on dependents to be orphaned
    pub fn is_orphaning(&self) -> bool {
        self.is_deleting() && self.has_finalizer(Finalizer::OrphanDependents)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

/// One entry of a watch stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub object: ObjectSnapshot,
}

impl WatchEvent {
    pub fn added(object: ObjectSnapshot) -> Self {
        Self { event_type: EventType::Added, object }
    }

    pub fn modified(object: ObjectSnapshot) -> Self {
        Self { event_type: EventType::Modified, object }
    }

    pub fn deleted(object: ObjectSnapshot) -> Self {
        Self { event_type: EventType::Deleted, object }
    }
}

/// Options accepted by a delete request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOptions {
    #[serde(default, rename = "synchronousGarbageCollection")]
    pub synchronous_gc: bool,
    #[serde(default)]
    pub orphan_dependents: bool,
}

impl DeleteOptions {
    /// Owner disappears at once, dependents are collected afterwards
    pub fn background() -> Self {
        Self::default()
    }

    pub fn synchronous() -> Self {
        Self { synchronous_gc: true, orphan_dependents: false }
    }

    pub fn orphan() -> Self {
        Self { synchronous_gc: false, orphan_dependents: true }
    }

    pub fn validate(&self) -> Result<(), GcError> {
        if self.synchronous_gc && self.orphan_dependents {
            return Err(GcError::InvalidOptions);
        }
        Ok(())
    }
}
