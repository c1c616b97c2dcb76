//! Contract with the external object store
//!
//! The collector never owns object state; it reads snapshots from a watch
//! stream and asks the store to delete objects or strip finalizers and
//! owner references. `MemoryStore` implements the contract in memory.

mod memory;

pub use memory::{MemoryStore, StoreCall};

use crate::errors::StoreError;
use crate::object::{DeleteOptions, Finalizer, ObjectIdentity, ObjectSnapshot};
use async_trait::async_trait;

#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Current state of an object; `NotFound` when it does not exist
    async fn get(&self, identity: &ObjectIdentity) -> Result<ObjectSnapshot, StoreError>;

    async fn delete(&self, identity: &ObjectIdentity, options: DeleteOptions) -> Result<(), StoreError>;

    async fn remove_finalizer(&self, identity: &ObjectIdentity, finalizer: Finalizer) -> Result<(), StoreError>;

    async fn remove_owner_references(
        &self,
        identity: &ObjectIdentity,
        owners: &[ObjectIdentity],
    ) -> Result<(), StoreError>;
}
