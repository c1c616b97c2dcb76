//! Error types for every layer of the collector
//!
//! - `GraphError`: invariant violations and stale snapshots in the object graph
//! - `QueueError`: operations on a shut down work queue
//! - `StoreError`: answers from the external object store
//! - `GcError`: crate-level error wrapping the above

use crate::object::ObjectIdentity;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Snapshot older than the state already recorded for the node
    #[error("stale snapshot for {identity}: recorded generation {current}, observed {observed}")]
    Conflict {
        identity: ObjectIdentity,
        current: i64,
        observed: i64,
    },

    /// Removal attempted while other nodes still list this one as owner
    #[error("{identity} still has {count} dependent(s)")]
    HasDependents { identity: ObjectIdentity, count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("work queue is shut down")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("object not found")]
    NotFound,

    #[error("conflicting concurrent update")]
    Conflict,

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GcError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid delete options: synchronousGarbageCollection and orphanDependents are mutually exclusive")]
    InvalidOptions,

    #[error("cancelled by shutdown")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),
}

impl GcError {
    /// A `NotFound` answer means the object is already gone
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::Conflict))
    }

    /// Errors caused by shutdown rather than by the item itself
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Queue(QueueError::Closed))
    }
}

pub type Result<T> = std::result::Result<T, GcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_convert() {
        let err: GcError = StoreError::NotFound.into();
        assert!(err.is_not_found());
        assert!(!err.is_conflict());

        let err: GcError = StoreError::Conflict.into();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_shutdown_classification() {
        assert!(GcError::Cancelled.is_shutdown());
        assert!(GcError::from(QueueError::Closed).is_shutdown());
        assert!(!GcError::InvalidOptions.is_shutdown());
    }

    #[test]
    fn test_messages() {
        let id = ObjectIdentity::new("v1", "Pod", "p", "u-1");
        let err = GraphError::HasDependents { identity: id, count: 2 };
        assert_eq!(err.to_string(), "[v1/Pod, name: p, uid: u-1] still has 2 dependent(s)");
        assert_eq!(
            StoreError::Timeout(Duration::from_millis(10)).to_string(),
            "store call timed out after 10ms"
        );
    }
}
