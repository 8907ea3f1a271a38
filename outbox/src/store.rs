//! MemoryStore - an in-process embedded datastore.
//!
//! Records live in ordered maps behind a mutex, so there is a single writer
//! at a time. A write transaction works on a private copy of the state and
//! swaps it in only when the transaction body and every listener it triggered
//! succeeded. Any error leaves the store exactly as it was.

use crate::{
    datastore::{Datastore, ReadTxn, Transaction},
    error::Result,
    snapshot::{SnapshotMetadata, StoreSnapshot, SNAPSHOT_FORMAT_VERSION},
    ChangeEvent, ChangeListener, Error, KindName, Record, RecordId, Schema, SubscriptionId,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// The records of one kind.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    records: BTreeMap<RecordId, Record>,
}

impl Collection {
    /// Get a record by ID.
    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.get(id)
    }

    /// Check if a record exists.
    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// All records in ID order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
struct State {
    collections: BTreeMap<KindName, Collection>,
}

impl State {
    fn new(schema: &Schema) -> Self {
        Self {
            collections: schema
                .kinds
                .keys()
                .map(|name| (name.clone(), Collection::default()))
                .collect(),
        }
    }

    fn collection(&self, kind: &str) -> Result<&Collection> {
        self.collections
            .get(kind)
            .ok_or_else(|| Error::KindNotFound(kind.to_string()))
    }

    fn collection_mut(&mut self, kind: &str) -> Result<&mut Collection> {
        self.collections
            .get_mut(kind)
            .ok_or_else(|| Error::KindNotFound(kind.to_string()))
    }

    fn query(&self, kind: &str, filter: &dyn Fn(&Record) -> bool) -> Result<Vec<Record>> {
        Ok(self
            .collection(kind)?
            .records()
            .filter(|r| filter(r))
            .cloned()
            .collect())
    }
}

/// Read-only view handed to `read` closures.
struct ReadView<'a> {
    state: &'a State,
}

impl ReadTxn for ReadView<'_> {
    fn query(&self, kind: &str, filter: &dyn Fn(&Record) -> bool) -> Result<Vec<Record>> {
        self.state.query(kind, filter)
    }

    fn get(&self, kind: &str, id: &str) -> Result<Option<Record>> {
        Ok(self.state.collection(kind)?.get(id).cloned())
    }

    fn count(&self, kind: &str) -> Result<usize> {
        Ok(self.state.collection(kind)?.len())
    }
}

/// A write transaction. Collections are copied on first write; reads fall
/// through to the committed state for kinds not yet touched.
struct WriteTxn<'a> {
    schema: &'a Schema,
    base: &'a State,
    touched: BTreeMap<KindName, Collection>,
    listeners: &'a [Arc<dyn ChangeListener>],
}

impl WriteTxn<'_> {
    fn collection(&self, kind: &str) -> Result<&Collection> {
        match self.touched.get(kind) {
            Some(collection) => Ok(collection),
            None => self.base.collection(kind),
        }
    }

    fn collection_mut(&mut self, kind: &str) -> Result<&mut Collection> {
        if !self.touched.contains_key(kind) {
            let copy = self.base.collection(kind)?.clone();
            self.touched.insert(kind.to_string(), copy);
        }
        self.touched
            .get_mut(kind)
            .ok_or_else(|| Error::KindNotFound(kind.to_string()))
    }

    fn notify(&mut self, event: ChangeEvent) -> Result<()> {
        let listeners = self.listeners;
        for listener in listeners {
            listener.on_change(&mut *self, &event)?;
        }
        Ok(())
    }
}

impl ReadTxn for WriteTxn<'_> {
    fn query(&self, kind: &str, filter: &dyn Fn(&Record) -> bool) -> Result<Vec<Record>> {
        Ok(self
            .collection(kind)?
            .records()
            .filter(|r| filter(r))
            .cloned()
            .collect())
    }

    fn get(&self, kind: &str, id: &str) -> Result<Option<Record>> {
        Ok(self.collection(kind)?.get(id).cloned())
    }

    fn count(&self, kind: &str) -> Result<usize> {
        Ok(self.collection(kind)?.len())
    }
}

impl Transaction for WriteTxn<'_> {
    fn insert(&mut self, record: Record) -> Result<()> {
        self.schema.validate_record(&record)?;

        let collection = self.collection_mut(&record.kind)?;
        if collection.contains(&record.id) {
            return Err(Error::RecordAlreadyExists {
                kind: record.kind,
                id: record.id,
            });
        }
        collection.records.insert(record.id.clone(), record.clone());

        self.notify(ChangeEvent::created(record))
    }

    fn update(&mut self, record: Record) -> Result<()> {
        self.schema.validate_record(&record)?;

        let collection = self.collection_mut(&record.kind)?;
        if !collection.contains(&record.id) {
            return Err(Error::RecordNotFound {
                kind: record.kind,
                id: record.id,
            });
        }
        collection.records.insert(record.id.clone(), record.clone());

        self.notify(ChangeEvent::updated(record))
    }

    fn delete(&mut self, kind: &str, id: &str) -> Result<Option<Record>> {
        // Absent records need no copy of the collection.
        if !self.collection(kind)?.contains(id) {
            return Ok(None);
        }
        let Some(removed) = self.collection_mut(kind)?.records.remove(id) else {
            return Ok(None);
        };

        self.notify(ChangeEvent::deleted(removed.clone()))?;
        Ok(Some(removed))
    }

    fn wipe(&mut self) -> Result<()> {
        let base = self.base;
        let mut wiped = Vec::new();
        for kind in base.collections.keys() {
            if !self.collection(kind)?.is_empty() {
                self.touched.insert(kind.clone(), Collection::default());
                wiped.push(kind.clone());
            }
        }

        for kind in wiped {
            self.notify(ChangeEvent::wiped(kind))?;
        }
        Ok(())
    }
}

/// An in-memory datastore with synchronous change notification.
pub struct MemoryStore {
    schema: Schema,
    state: Mutex<State>,
    listeners: RwLock<BTreeMap<SubscriptionId, Arc<dyn ChangeListener>>>,
    next_subscription: AtomicU64,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("schema_version", &self.schema.version)
            .field("kinds", &self.schema.kinds.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Create an empty store. The outbox kind is always declared.
    pub fn new(mut schema: Schema) -> Self {
        schema.ensure_outbox();
        let state = State::new(&schema);

        Self {
            schema,
            state: Mutex::new(state),
            listeners: RwLock::new(BTreeMap::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Create a store and restore a snapshot into it.
    pub fn from_snapshot(schema: Schema, snapshot: StoreSnapshot) -> Result<Self> {
        let store = Self::new(schema);
        store.import_state(snapshot)?;
        Ok(store)
    }

    /// Get the schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().map_or(0, |l| l.len())
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::Storage("store lock poisoned".into()))
    }

    /// Insert a record in its own transaction.
    pub fn insert(&self, record: Record) -> Result<()> {
        self.write(|txn| txn.insert(record))
    }

    /// Update a record in its own transaction.
    pub fn update(&self, record: Record) -> Result<()> {
        self.write(|txn| txn.update(record))
    }

    /// Delete a record in its own transaction.
    pub fn delete(&self, kind: &str, id: &str) -> Result<Option<Record>> {
        self.write(|txn| txn.delete(kind, id))
    }

    /// Remove every record, outbox entries included.
    pub fn wipe(&self) -> Result<()> {
        self.write(|txn| txn.wipe())
    }

    /// Get a record by kind and ID.
    pub fn get(&self, kind: &str, id: &str) -> Result<Option<Record>> {
        self.read(|txn| txn.get(kind, id))
    }

    /// Count records of a kind.
    pub fn count(&self, kind: &str) -> Result<usize> {
        self.read(|txn| txn.count(kind))
    }

    /// Export the current state as a snapshot.
    pub fn export_state(&self) -> Result<StoreSnapshot> {
        let state = self.lock_state()?;
        let mut snapshot = StoreSnapshot::new(self.schema.version);
        for (kind, collection) in &state.collections {
            if !collection.is_empty() {
                snapshot
                    .kinds
                    .insert(kind.clone(), collection.records.clone());
            }
        }
        Ok(snapshot)
    }

    /// Replace the current state with a snapshot's.
    ///
    /// Restoring is not a mutation: listeners are not notified.
    pub fn import_state(&self, snapshot: StoreSnapshot) -> Result<()> {
        snapshot.validate(&self.schema)?;

        let mut restored = State::new(&self.schema);
        for (kind, records) in snapshot.kinds {
            restored.collection_mut(&kind)?.records = records;
        }

        *self.lock_state()? = restored;
        tracing::debug!(schema_version = self.schema.version, "store state imported");
        Ok(())
    }

    /// Get snapshot metadata without a full export.
    pub fn snapshot_metadata(&self) -> Result<SnapshotMetadata> {
        let state = self.lock_state()?;
        Ok(SnapshotMetadata {
            format_version: SNAPSHOT_FORMAT_VERSION,
            schema_version: self.schema.version,
            record_count: state.collections.values().map(Collection::len).sum(),
            pending_count: state
                .collections
                .get(crate::ChangeEntry::KIND)
                .map_or(0, Collection::len),
        })
    }
}

impl Datastore for MemoryStore {
    fn subscribe(&self, listener: Arc<dyn ChangeListener>) -> Result<SubscriptionId> {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst));
        self.listeners
            .write()
            .map_err(|_| Error::Storage("listener registry poisoned".into()))?
            .insert(id, listener);
        tracing::trace!(subscription = %id, "listener subscribed");
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> Result<bool> {
        let removed = self
            .listeners
            .write()
            .map_err(|_| Error::Storage("listener registry poisoned".into()))?
            .remove(&id)
            .is_some();
        tracing::trace!(subscription = %id, removed, "listener unsubscribed");
        Ok(removed)
    }

    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn ReadTxn) -> Result<T>,
    {
        let state = self.lock_state()?;
        f(&ReadView { state: &state })
    }

    fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T>,
    {
        let mut state = self.lock_state()?;

        // Listeners registered mid-transaction only see later transactions.
        let listeners: Vec<Arc<dyn ChangeListener>> = self
            .listeners
            .read()
            .map_err(|_| Error::Storage("listener registry poisoned".into()))?
            .values()
            .cloned()
            .collect();

        let mut txn = WriteTxn {
            schema: &self.schema,
            base: &state,
            touched: BTreeMap::new(),
            listeners: &listeners,
        };

        match f(&mut txn) {
            Ok(out) => {
                let WriteTxn { touched, .. } = txn;
                state.collections.extend(touched);
                Ok(out)
            }
            Err(e) => {
                tracing::debug!(error = %e, "write transaction rolled back");
                Err(e)
            }
        }
    }
}
