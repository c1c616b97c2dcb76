//! Synchronous, finalizer-driven cascading garbage collection over an
//! owner/dependent object graph.
//!
//! Objects reference their owners; deleting an owner deletes its dependents.
//! With synchronous deletion the owner carries the `CollectingGarbage`
//! finalizer and stays observable until every blocking dependent is gone.

// Core modules
pub mod config;
pub mod controller;
pub mod errors;
pub mod graph;
pub mod infrastructure;
pub mod ingest;
pub mod object;
pub mod processor;
pub mod queue;
pub mod store;

// Re-export commonly used items
pub use config::GcConfig;
pub use controller::GarbageCollector;
pub use errors::{GcError, GraphError, QueueError, Result, StoreError};
pub use graph::{DeletionOutcome, GraphNode, ObjectGraph, UpsertOutcome};
pub use infrastructure::{init_logging, CancellationToken, GcMetrics, LogConfig, LogFormat, LogOutput};
pub use ingest::{AllowAll, BlockingAuthorizer, EventIngestor};
pub use object::{
    DeleteOptions, EventType, Finalizer, ObjectIdentity, ObjectSnapshot, OwnerReference, Uid, WatchEvent,
};
pub use processor::{Action, CycleVerdict, ItemProcessor};
pub use queue::DirtyQueue;
pub use store::{MemoryStore, ObjectStore, StoreCall};
