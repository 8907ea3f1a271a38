//! The sync queue: change capture into the outbox and the drain operations.
//!
//! While enabled, the queue's capture handler is subscribed to the datastore
//! and runs inside every write transaction. For each created, updated or
//! deleted record of a synchronized kind it adds a [`ChangeEntry`] to the
//! outbox, unless an entry with the same `(changeType, recordType, recordId)`
//! is already pending. Because the entry is written through the mutation's own
//! transaction, the mutation and its entry commit or roll back together.
//!
//! A sync client drains the queue with [`SyncQueue::next`] and, once the
//! server has the entries, [`SyncQueue::acknowledge`].

use crate::{
    clock::{Clock, SystemClock},
    config::OutboxConfig,
    datastore::{Datastore, ReadTxn, Transaction},
    entry::{record_seq, sort_for_sync, ChangeEntry, DedupKey},
    error::Result,
    schema::SyncedKinds,
    ChangeEvent, ChangeListener, Error, Record, SubscriptionId,
};
use std::cell::Cell;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// All pending entries, unordered.
fn pending_entries<R: ReadTxn + ?Sized>(txn: &R) -> Result<Vec<ChangeEntry>> {
    txn.query(ChangeEntry::KIND, &|_: &Record| true)?
        .iter()
        .map(ChangeEntry::from_record)
        .collect()
}

/// The capture handler registered with the datastore.
struct Capture {
    synced_kinds: SyncedKinds,
    clock: Arc<dyn Clock>,
}

impl ChangeListener for Capture {
    fn on_change(&self, txn: &mut dyn Transaction, event: &ChangeEvent) -> Result<()> {
        if !self.synced_kinds.contains(&event.kind) {
            return Ok(());
        }
        // Wipes clear the outbox along with everything else.
        let Some(change_type) = event.mutation.change_type() else {
            tracing::trace!(kind = %event.kind, mutation = ?event.mutation, "ignoring bulk mutation");
            return Ok(());
        };
        let Some(record_id) = event.record_id() else {
            tracing::trace!(kind = %event.kind, "ignoring record without id");
            return Ok(());
        };

        let key = DedupKey {
            change_type,
            record_type: &event.kind,
            record_id,
        };
        // One pass: collect duplicates and the highest sequence in use.
        let max_seq = Cell::new(0);
        let duplicates = txn.query(ChangeEntry::KIND, &|rec: &Record| {
            if let Some(seq) = record_seq(rec) {
                max_seq.set(max_seq.get().max(seq));
            }
            key.matches_record(rec)
        })?;
        if !duplicates.is_empty() {
            tracing::trace!(
                change_type = %change_type,
                record_type = %event.kind,
                record_id,
                "change already pending"
            );
            return Ok(());
        }

        let seq = max_seq.get() + 1;
        let entry = ChangeEntry::new(
            Uuid::new_v4().to_string(),
            self.clock.now_millis(),
            seq,
            change_type,
            event.kind.as_str(),
            record_id,
        );
        txn.insert(entry.to_record()?)?;

        tracing::debug!(
            entry_id = %entry.id,
            change_type = %change_type,
            record_type = %entry.record_type,
            record_id = %entry.record_id,
            change_time = entry.change_time,
            seq,
            "change enqueued"
        );
        Ok(())
    }
}

/// Outbox queue over an injected datastore.
///
/// The queue starts disabled. Concurrent drains (`next` followed by
/// `acknowledge`) must be serialized by the caller.
pub struct SyncQueue<S: Datastore> {
    store: Arc<S>,
    capture: Arc<Capture>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl<S: Datastore> SyncQueue<S> {
    /// Create a disabled queue stamping entries with the system clock.
    pub fn new(store: Arc<S>, synced_kinds: SyncedKinds) -> Result<Self> {
        Self::with_clock(store, synced_kinds, Arc::new(SystemClock))
    }

    /// Create a disabled queue with an explicit clock.
    pub fn with_clock(
        store: Arc<S>,
        synced_kinds: SyncedKinds,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        synced_kinds.validate()?;
        Ok(Self {
            store,
            capture: Arc::new(Capture {
                synced_kinds,
                clock,
            }),
            subscription: Mutex::new(None),
        })
    }

    /// Create a disabled queue from validated configuration.
    pub fn from_config(store: Arc<S>, config: &OutboxConfig) -> Result<Self> {
        config.validate()?;
        Self::new(store, config.synced_kinds.clone())
    }

    /// The datastore this queue captures from.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The whitelist of captured kinds.
    pub fn synced_kinds(&self) -> &SyncedKinds {
        &self.capture.synced_kinds
    }

    fn lock_subscription(&self) -> Result<MutexGuard<'_, Option<SubscriptionId>>> {
        self.subscription
            .lock()
            .map_err(|_| Error::Storage("subscription lock poisoned".into()))
    }

    /// Start capturing mutations.
    ///
    /// Enabling an enabled queue replaces its subscription, so mutations are
    /// never captured twice.
    pub fn enable(&self) -> Result<SubscriptionId> {
        let mut slot = self.lock_subscription()?;
        if let Some(previous) = *slot {
            self.store.unsubscribe(previous)?;
            *slot = None;
        }

        let id = self.store.subscribe(self.capture.clone())?;
        *slot = Some(id);

        tracing::info!(
            subscription = %id,
            kinds = self.capture.synced_kinds.len(),
            "sync queue enabled"
        );
        Ok(id)
    }

    /// Stop capturing mutations.
    ///
    /// Returns `false` if the queue was not enabled.
    pub fn disable(&self) -> Result<bool> {
        let mut slot = self.lock_subscription()?;
        let Some(id) = *slot else {
            return Ok(false);
        };

        self.store.unsubscribe(id)?;
        *slot = None;
        tracing::info!(subscription = %id, "sync queue disabled");
        Ok(true)
    }

    pub fn is_enabled(&self) -> bool {
        self.subscription.lock().map_or(false, |s| s.is_some())
    }

    /// Number of pending entries.
    pub fn length(&self) -> Result<usize> {
        self.store.read(|txn| txn.count(ChangeEntry::KIND))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.length()? == 0)
    }

    /// The `count` oldest pending entries, oldest first.
    ///
    /// Entries are ordered by `changeTime`, then insertion sequence, then ID.
    /// A `count` of zero yields an empty batch.
    pub fn next(&self, count: usize) -> Result<Vec<ChangeEntry>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut entries = self.pending()?;
        entries.truncate(count);
        Ok(entries)
    }

    /// The single oldest pending entry.
    pub fn next_entry(&self) -> Result<Option<ChangeEntry>> {
        Ok(self.next(1)?.into_iter().next())
    }

    /// Every pending entry, oldest first.
    pub fn pending(&self) -> Result<Vec<ChangeEntry>> {
        let mut entries = self.store.read(|txn| pending_entries(txn))?;
        sort_for_sync(&mut entries);
        Ok(entries)
    }

    /// Remove acknowledged entries in one transaction.
    ///
    /// Entries that are no longer pending are skipped, so retrying a batch is
    /// safe. If any removal fails, no entry of the batch is removed. Returns
    /// the number of entries actually removed.
    pub fn acknowledge(&self, entries: &[ChangeEntry]) -> Result<usize> {
        let removed = self.store.write(|txn| {
            let mut removed = 0;
            for entry in entries {
                if txn.delete(ChangeEntry::KIND, &entry.id)?.is_some() {
                    removed += 1;
                }
            }
            Ok(removed)
        })?;

        tracing::debug!(
            requested = entries.len(),
            removed,
            "entries acknowledged"
        );
        Ok(removed)
    }
}

impl<S: Datastore> Drop for SyncQueue<S> {
    fn drop(&mut self) {
        let id = match self.subscription.get_mut() {
            Ok(slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(id) = id {
            if let Err(e) = self.store.unsubscribe(id) {
                tracing::warn!(subscription = %id, error = %e, "failed to unsubscribe dropped sync queue");
            }
        }
    }
}
