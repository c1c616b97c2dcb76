//! In-memory owner/dependent graph mirroring the store
//!
//! Adjacency is kept as identity-indexed sets: every node stores its owners
//! and, as derived back-references, its dependents. The whole graph sits
//! behind one coarse `RwLock`: lookups vastly outnumber mutations and no
//! caller holds the lock across an `.await`.

mod node;

pub use node::GraphNode;

use crate::errors::GraphError;
use crate::object::{ObjectIdentity, OwnerReference};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::trace;

/// Topology changes produced by `ObjectGraph::upsert`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// First real observation (new, previously virtual, or previously deleted)
    pub created: bool,
    pub added_owners: Vec<ObjectIdentity>,
    pub removed_owners: Vec<ObjectIdentity>,
    /// Existing owner references whose `blocking` flag flipped
    pub blocking_changed_owners: Vec<ObjectIdentity>,
}

impl UpsertOutcome {
    pub fn topology_changed(&self) -> bool {
        !self.added_owners.is_empty()
            || !self.removed_owners.is_empty()
            || !self.blocking_changed_owners.is_empty()
    }
}

/// Result of observing a Deleted event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionOutcome {
    /// Former owners with their `gc_in_progress` flag at removal time
    pub owners: Vec<(ObjectIdentity, bool)>,
    /// Nodes that still list the deleted object as owner
    pub dependents: Vec<ObjectIdentity>,
    /// False when the node was kept as a tombstone for its dependents
    pub removed: bool,
}

pub struct ObjectGraph {
    nodes: RwLock<HashMap<ObjectIdentity, GraphNode>>,
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
        }
    }

    /// Create or update a node from a snapshot and reconcile back-references
    ///
    /// Owners not seen yet get virtual nodes. Virtual or deleted owners that
    /// lose their last dependent are dropped.
    pub fn upsert(
        &self,
        identity: &ObjectIdentity,
        owners: &[OwnerReference],
        generation: i64,
        observed_generation: Option<i64>,
    ) -> Result<UpsertOutcome, GraphError> {
        let mut nodes = self.nodes.write();
        let mut outcome = UpsertOutcome::default();

        let previous = match nodes.get_mut(identity) {
            Some(node) => {
                let known = !node.is_virtual && !node.deletion_observed;
                if known && generation < node.generation {
                    return Err(GraphError::Conflict {
                        identity: identity.clone(),
                        current: node.generation,
                        observed: generation,
                    });
                }
                outcome.created = !known;
                node.is_virtual = false;
                node.deletion_observed = false;
                node.generation = generation;
                node.observed_generation = observed_generation;
                std::mem::take(&mut node.owners)
            }
            None => {
                nodes.insert(
                    identity.clone(),
                    GraphNode::observed(identity.clone(), generation, observed_generation),
                );
                outcome.created = true;
                IndexMap::new()
            }
        };

        let mut next: IndexMap<ObjectIdentity, bool> = IndexMap::with_capacity(owners.len());
        for reference in owners {
            *next.entry(reference.owner.clone()).or_insert(false) |= reference.blocking;
        }

        for (owner, blocking) in &next {
            match previous.get(owner) {
                None => outcome.added_owners.push(owner.clone()),
                Some(was) if was != blocking => outcome.blocking_changed_owners.push(owner.clone()),
                Some(_) => {}
            }
        }
        outcome.removed_owners = previous
            .keys()
            .filter(|owner| !next.contains_key(*owner))
            .cloned()
            .collect();

        for owner in &outcome.added_owners {
            nodes
                .entry(owner.clone())
                .or_insert_with(|| {
                    trace!(owner = %owner, "tracking virtual owner");
                    GraphNode::virtual_owner(owner.clone())
                })
                .dependents
                .insert(identity.clone());
        }
        for owner in &outcome.removed_owners {
            Self::detach(&mut nodes, owner, identity);
        }

        if let Some(node) = nodes.get_mut(identity) {
            node.owners = next;
        }

        Ok(outcome)
    }

    /// Returns false for unknown identities
    pub fn mark_deletion_requested(&self, identity: &ObjectIdentity) -> bool {
        match self.nodes.write().get_mut(identity) {
            Some(node) => {
                node.deletion_requested = true;
                true
            }
            None => false,
        }
    }

    /// Setting the flag also marks deletion requested
    pub fn mark_gc_in_progress(&self, identity: &ObjectIdentity, in_progress: bool) -> bool {
        match self.nodes.write().get_mut(identity) {
            Some(node) => {
                node.gc_in_progress = in_progress;
                node.deletion_requested |= in_progress;
                true
            }
            None => false,
        }
    }

    /// Setting the flag also marks deletion requested
    pub fn mark_orphan_in_progress(&self, identity: &ObjectIdentity, in_progress: bool) -> bool {
        match self.nodes.write().get_mut(identity) {
            Some(node) => {
                node.orphan_in_progress = in_progress;
                node.deletion_requested |= in_progress;
                true
            }
            None => false,
        }
    }

    /// Drop a node that no other node references
    ///
    /// Fails with `HasDependents` otherwise; the graph is left unchanged.
    pub fn remove(&self, identity: &ObjectIdentity) -> Result<Option<GraphNode>, GraphError> {
        let mut nodes = self.nodes.write();
        Self::remove_locked(&mut nodes, identity)
    }

    /// Apply a Deleted event
    ///
    /// The node is detached from its owners, then removed, or kept as a
    /// tombstone while other nodes still list it as owner.
    pub fn observe_deletion(&self, identity: &ObjectIdentity) -> Option<DeletionOutcome> {
        let mut nodes = self.nodes.write();
        let node = nodes.get_mut(identity)?;

        let dependents: Vec<ObjectIdentity> = node.dependents.iter().cloned().collect();
        let owners = if dependents.is_empty() {
            match Self::remove_locked(&mut nodes, identity) {
                Ok(Some(removed)) => removed.owners,
                _ => IndexMap::new(),
            }
        } else {
            node.deletion_observed = true;
            node.deletion_requested = true;
            node.gc_in_progress = false;
            node.orphan_in_progress = false;
            let owners = std::mem::take(&mut node.owners);
            for owner in owners.keys() {
                Self::detach(&mut nodes, owner, identity);
            }
            owners
        };

        // remove_locked and the tombstone branch detached already; read the
        // owners' flags from what is left
        let owners = owners
            .into_keys()
            .map(|owner| {
                let collecting = nodes.get(&owner).map_or(false, |n| n.gc_in_progress);
                (owner, collecting)
            })
            .collect();

        Some(DeletionOutcome {
            owners,
            removed: dependents.is_empty(),
            dependents,
        })
    }

    /// Empty for unknown identities
    pub fn owners_of(&self, identity: &ObjectIdentity) -> Vec<OwnerReference> {
        self.nodes
            .read()
            .get(identity)
            .map(GraphNode::owner_references)
            .unwrap_or_default()
    }

    /// Empty for unknown identities
    pub fn dependents_of(&self, identity: &ObjectIdentity) -> Vec<ObjectIdentity> {
        self.nodes
            .read()
            .get(identity)
            .map(|node| node.dependents.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Some live dependent lists `identity` as a blocking owner
    pub fn is_blocking_dependent_present(&self, identity: &ObjectIdentity) -> bool {
        let nodes = self.nodes.read();
        let Some(node) = nodes.get(identity) else {
            return false;
        };
        node.dependents
            .iter()
            .filter_map(|d| nodes.get(d))
            .any(|d| d.is_live() && d.is_blocked_by(identity))
    }

    /// Live dependents that list `identity` as a blocking owner
    pub fn blocking_dependents(&self, identity: &ObjectIdentity) -> Vec<ObjectIdentity> {
        let nodes = self.nodes.read();
        let Some(node) = nodes.get(identity) else {
            return Vec::new();
        };
        node.dependents
            .iter()
            .filter_map(|d| nodes.get(d))
            .filter(|d| d.is_live() && d.is_blocked_by(identity))
            .map(|d| d.identity.clone())
            .collect()
    }

    pub fn node(&self, identity: &ObjectIdentity) -> Option<GraphNode> {
        self.nodes.read().get(identity).cloned()
    }

    pub fn contains(&self, identity: &ObjectIdentity) -> bool {
        self.nodes.read().contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    pub fn identities(&self) -> Vec<ObjectIdentity> {
        self.nodes.read().keys().cloned().collect()
    }

    fn remove_locked(
        nodes: &mut HashMap<ObjectIdentity, GraphNode>,
        identity: &ObjectIdentity,
    ) -> Result<Option<GraphNode>, GraphError> {
        match nodes.get(identity) {
            None => return Ok(None),
            Some(node) if !node.dependents.is_empty() => {
                return Err(GraphError::HasDependents {
                    identity: identity.clone(),
                    count: node.dependents.len(),
                });
            }
            Some(_) => {}
        }

        let removed = nodes.remove(identity);
        if let Some(node) = &removed {
            for owner in node.owners.keys() {
                Self::detach(nodes, owner, identity);
            }
        }
        Ok(removed)
    }

    /// Remove one back-reference; drop the owner if nothing real keeps it
    fn detach(
        nodes: &mut HashMap<ObjectIdentity, GraphNode>,
        owner: &ObjectIdentity,
        dependent: &ObjectIdentity,
    ) {
        let unreferenced = match nodes.get_mut(owner) {
            Some(node) => {
                node.dependents.remove(dependent);
                node.dependents.is_empty() && (node.is_virtual || node.deletion_observed)
            }
            None => false,
        };
        if unreferenced {
            trace!(owner = %owner, "dropping unreferenced owner");
            nodes.remove(owner);
        }
    }
}

impl Default for ObjectGraph {
    fn default() -> Self {
        Self::new()
    }
}
