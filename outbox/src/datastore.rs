//! The capability interface the sync queue needs from an embedded datastore.
//!
//! The queue never reaches for global state: it is handed an implementation
//! of [`Datastore`] at construction and talks to it only through these
//! traits. [`MemoryStore`](crate::MemoryStore) is the in-process
//! implementation.

use crate::{error::Result, ChangeListener, Record, SubscriptionId};
use std::sync::Arc;

/// Read access inside a transaction.
///
/// Queries return owned, point-in-time snapshots; nothing returned here
/// tracks later changes.
pub trait ReadTxn {
    /// All records of `kind` matching `filter`, in ID order.
    fn query(&self, kind: &str, filter: &dyn Fn(&Record) -> bool) -> Result<Vec<Record>>;

    /// A single record by ID.
    fn get(&self, kind: &str, id: &str) -> Result<Option<Record>>;

    /// Number of records of `kind`.
    fn count(&self, kind: &str) -> Result<usize>;
}

/// Write access inside a transaction.
///
/// Every mutation is reported to the datastore's listeners before the call
/// returns, within this same transaction.
pub trait Transaction: ReadTxn {
    /// Create a record. Fails if one with the same kind and ID exists.
    fn insert(&mut self, record: Record) -> Result<()>;

    /// Replace an existing record.
    fn update(&mut self, record: Record) -> Result<()>;

    /// Remove a record, returning it. Absent records are not an error.
    fn delete(&mut self, kind: &str, id: &str) -> Result<Option<Record>>;

    /// Remove every record of every kind.
    fn wipe(&mut self) -> Result<()>;
}

/// An embedded datastore with change notification.
pub trait Datastore: Send + Sync {
    /// Register a listener for mutations in later write transactions.
    fn subscribe(&self, listener: Arc<dyn ChangeListener>) -> Result<SubscriptionId>;

    /// Remove a listener. Returns `false` if the handle was not registered.
    fn unsubscribe(&self, id: SubscriptionId) -> Result<bool>;

    /// Run `f` against a consistent snapshot.
    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn ReadTxn) -> Result<T>;

    /// Run `f` atomically. If `f` or any listener it triggers fails, none of
    /// its writes are kept.
    fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T>;
}
