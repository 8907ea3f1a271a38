//! # Sync Outbox
//!
//! Change capture for offline-first applications.
//!
//! This crate is the client-side half of a sync pipeline. Every mutation made
//! to a local embedded datastore is captured into an **outbox**, inside the
//! same transaction as the mutation, and held there until a sync client has
//! delivered it to the server.
//!
//! ## Core Concepts
//!
//! ### Datastore
//!
//! The queue talks to its datastore only through the [`Datastore`] and
//! [`Transaction`] traits: subscribe/unsubscribe, query, insert, update,
//! delete and atomic write transactions. [`MemoryStore`] is the in-process
//! implementation, with schema validation ([`Schema`]) and JSON snapshots
//! ([`StoreSnapshot`]) for persistence.
//!
//! ### Change Entries
//!
//! A [`ChangeEntry`] records that a record of a synchronized kind was
//! created, updated or deleted. At most one entry per
//! `(changeType, recordType, recordId)` is pending at a time.
//!
//! ### Sync Queue
//!
//! The [`SyncQueue`] captures changes while enabled and serves them oldest
//! first:
//! - [`SyncQueue::length`] - number of pending entries
//! - [`SyncQueue::next`] - the oldest entries, without removing them
//! - [`SyncQueue::acknowledge`] - remove delivered entries (idempotent)
//!
//! ### Drainer
//!
//! [`Drainer`] runs the `next` / push / `acknowledge` cycle against a
//! [`Transport`] on a tokio interval.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use sync_outbox::{
//!     ChangeType, FieldDef, FieldType, KindSchema, MemoryStore, Record, Schema, SyncQueue,
//! };
//! use serde_json::json;
//!
//! // 1. Declare kinds; synced ones form the whitelist
//! let schema = Schema::new(1)
//!     .with_kind(
//!         KindSchema::new("Transaction", vec![FieldDef::required("amount", FieldType::Int)])
//!             .synced(),
//!     )
//!     .with_kind(KindSchema::new("Setting", vec![]));
//!
//! // 2. Create the store and an enabled queue
//! let whitelist = schema.synced_kinds();
//! let store = Arc::new(MemoryStore::new(schema));
//! let queue = SyncQueue::new(store.clone(), whitelist).unwrap();
//! queue.enable().unwrap();
//!
//! // 3. Mutations are captured as they commit
//! store.insert(Record::new("t1", "Transaction", json!({"amount": 1200}))).unwrap();
//! store.insert(Record::new("s1", "Setting", json!({}))).unwrap();
//! assert_eq!(queue.length().unwrap(), 1);
//!
//! // 4. Drain
//! let batch = queue.next(10).unwrap();
//! assert_eq!(batch[0].change_type, ChangeType::Create);
//! assert_eq!(batch[0].record_id, "t1");
//! queue.acknowledge(&batch).unwrap();
//! assert_eq!(queue.length().unwrap(), 0);
//! ```

pub mod clock;
pub mod config;
pub mod datastore;
pub mod drain;
pub mod entry;
pub mod error;
pub mod event;
pub mod queue;
pub mod record;
pub mod schema;
pub mod snapshot;
pub mod store;

// Re-export main types at crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, OutboxConfig};
pub use datastore::{Datastore, ReadTxn, Transaction};
pub use drain::{Drainer, Transport};
pub use entry::{ChangeEntry, ChangeType, DedupKey, EntryId};
pub use error::Error;
pub use event::{ChangeEvent, ChangeListener, Mutation, SubscriptionId};
pub use queue::SyncQueue;
pub use record::Record;
pub use schema::{FieldDef, FieldType, KindSchema, Schema, SyncedKinds};
pub use snapshot::{SnapshotMetadata, StoreSnapshot, SNAPSHOT_FORMAT_VERSION};
pub use store::{Collection, MemoryStore};

/// Type aliases for clarity
pub type RecordId = String;
pub type KindName = String;
pub type Timestamp = u64;
pub type SchemaVersion = u32;
