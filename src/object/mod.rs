//! Object model shared by every component
//!
//! Identities, owner references, finalizers, snapshots and the watch events
//! that carry them. Kinds are opaque string tags: nothing in the collector
//! behaves differently per kind, only identity comparison matters.

mod identity;
mod snapshot;

pub use identity::{ObjectIdentity, OwnerReference, Uid};
pub use snapshot::{DeleteOptions, EventType, Finalizer, ObjectSnapshot, WatchEvent};
