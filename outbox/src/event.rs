//! Mutation events emitted by a datastore during write transactions.

use crate::{entry::ChangeType, error::Result, Record, Transaction};
use serde::{Deserialize, Serialize};

/// What happened to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mutation {
    Created,
    Updated,
    Deleted,
    /// Every record of a kind was removed at once
    Wiped,
}

impl Mutation {
    /// The change type this mutation is synchronized as, if any.
    pub fn change_type(&self) -> Option<ChangeType> {
        match self {
            Mutation::Created => Some(ChangeType::Create),
            Mutation::Updated => Some(ChangeType::Update),
            Mutation::Deleted => Some(ChangeType::Delete),
            Mutation::Wiped => None,
        }
    }
}

/// One mutated record, as seen by listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub mutation: Mutation,
    /// Kind of the mutated record
    pub kind: String,
    /// The record after the mutation (before it, for deletes).
    /// Absent for wipes.
    pub record: Option<Record>,
}

impl ChangeEvent {
    pub fn created(record: Record) -> Self {
        Self {
            mutation: Mutation::Created,
            kind: record.kind.clone(),
            record: Some(record),
        }
    }

    pub fn updated(record: Record) -> Self {
        Self {
            mutation: Mutation::Updated,
            kind: record.kind.clone(),
            record: Some(record),
        }
    }

    pub fn deleted(record: Record) -> Self {
        Self {
            mutation: Mutation::Deleted,
            kind: record.kind.clone(),
            record: Some(record),
        }
    }

    pub fn wiped(kind: impl Into<String>) -> Self {
        Self {
            mutation: Mutation::Wiped,
            kind: kind.into(),
            record: None,
        }
    }

    /// The mutated record's identifier, if it has a non-blank one.
    pub fn record_id(&self) -> Option<&str> {
        self.record
            .as_ref()
            .filter(|r| r.has_id())
            .map(|r| r.id.as_str())
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A callback invoked synchronously for every mutated record.
///
/// Listeners run inside the write transaction that performed the mutation and
/// receive that transaction. Returning an error aborts the whole transaction,
/// the triggering mutation included.
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, txn: &mut dyn Transaction, event: &ChangeEvent) -> Result<()>;
}
