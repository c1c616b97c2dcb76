use crate::object::{ObjectIdentity, OwnerReference};
use indexmap::IndexMap;
use std::collections::HashSet;

/// One tracked object
///
/// Returned by value from `ObjectGraph`; mutating a copy has no effect on
/// the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub identity: ObjectIdentity,
    /// Owner identity -> `blocking`, in the order the object lists them
    pub owners: IndexMap<ObjectIdentity, bool>,
    /// Nodes listing this one as owner (back-references)
    pub dependents: HashSet<ObjectIdentity>,
    pub deletion_requested: bool,
    /// Carries `CollectingGarbage` and a deletion timestamp
    pub gc_in_progress: bool,
    /// Carries `orphan` and a deletion timestamp
    pub orphan_in_progress: bool,
    pub generation: i64,
    pub observed_generation: Option<i64>,
    /// Known only as an owner-reference target
    pub is_virtual: bool,
    /// Deleted, kept while dependents still reference it
    pub deletion_observed: bool,
}

impl GraphNode {
    pub(crate) fn observed(identity: ObjectIdentity, generation: i64, observed_generation: Option<i64>) -> Self {
        Self {
            identity,
            owners: IndexMap::new(),
            dependents: HashSet::new(),
            deletion_requested: false,
            gc_in_progress: false,
            orphan_in_progress: false,
            generation,
            observed_generation,
            is_virtual: false,
            deletion_observed: false,
        }
    }

    pub(crate) fn virtual_owner(identity: ObjectIdentity) -> Self {
        Self {
            is_virtual: true,
            ..Self::observed(identity, 0, None)
        }
    }

    /// Present in the store as far as the graph knows
    pub fn is_live(&self) -> bool {
        !self.deletion_observed
    }

    /// Gone, or being deleted without orphaning its dependents
    pub fn is_absent_owner(&self) -> bool {
        self.deletion_observed || (self.deletion_requested && !self.orphan_in_progress)
    }

    pub fn is_blocked_by(&self, owner: &ObjectIdentity) -> bool {
        self.owners.get(owner).copied().unwrap_or(false)
    }

    /// The object's controller has not observed the latest generation yet
    pub fn generation_lagging(&self) -> bool {
        matches!(self.observed_generation, Some(observed) if observed < self.generation)
    }

    pub fn owner_references(&self) -> Vec<OwnerReference> {
        self.owners
            .iter()
            .map(|(owner, blocking)| OwnerReference { owner: owner.clone(), blocking: *blocking })
            .collect()
    }
}
