//! Snapshot types for persisting and restoring datastore state.
//!
//! Snapshots are the bridge between the in-memory store and persistent
//! storage. Outbox entries are ordinary records of the outbox kind, so pending
//! changes survive a save/restore cycle with everything else.

use crate::{
    entry::ChangeEntry, error::Result, Error, KindName, Record, RecordId, Schema, SchemaVersion,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A point-in-time snapshot of the datastore.
///
/// Uses BTreeMap for deterministic serialization order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// Schema version at time of snapshot
    pub schema_version: SchemaVersion,
    /// All records organized by kind, then by record ID
    pub kinds: BTreeMap<KindName, BTreeMap<RecordId, Record>>,
}

impl StoreSnapshot {
    /// Create a new empty snapshot.
    pub fn new(schema_version: SchemaVersion) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            schema_version,
            kinds: BTreeMap::new(),
        }
    }

    /// Add a record to the snapshot.
    pub fn add_record(&mut self, record: Record) {
        self.kinds
            .entry(record.kind.clone())
            .or_default()
            .insert(record.id.clone(), record);
    }

    /// Get a record from the snapshot.
    pub fn get_record(&self, kind: &str, id: &str) -> Option<&Record> {
        self.kinds.get(kind)?.get(id)
    }

    /// Count total records across all kinds, outbox entries included.
    pub fn record_count(&self) -> usize {
        self.kinds.values().map(|k| k.len()).sum()
    }

    /// Count pending outbox entries.
    pub fn pending_count(&self) -> usize {
        self.kinds.get(ChangeEntry::KIND).map_or(0, |k| k.len())
    }

    /// Validate the snapshot against a schema.
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        if self.schema_version != schema.version {
            return Err(Error::SchemaVersionMismatch {
                expected: schema.version,
                actual: self.schema_version,
            });
        }

        for (kind, records) in &self.kinds {
            if schema.get_kind(kind).is_none() {
                return Err(Error::KindNotFound(kind.clone()));
            }

            for (id, record) in records {
                if &record.id != id || &record.kind != kind {
                    return Err(Error::InvalidSnapshot(format!(
                        "record {}/{} filed under {}/{}",
                        record.kind, record.id, kind, id
                    )));
                }
                schema.validate_record(record)?;
            }
        }

        Ok(())
    }

    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Serialize to pretty JSON with deterministic ordering.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        Ok(snapshot)
    }
}

/// Metadata about a snapshot (without the full data).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub format_version: u32,
    pub schema_version: SchemaVersion,
    pub record_count: usize,
    pub pending_count: usize,
}

impl From<&StoreSnapshot> for SnapshotMetadata {
    fn from(snapshot: &StoreSnapshot) -> Self {
        Self {
            format_version: snapshot.format_version,
            schema_version: snapshot.schema_version,
            record_count: snapshot.record_count(),
            pending_count: snapshot.pending_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ChangeType;
    use crate::schema::{FieldDef, FieldType, KindSchema};
    use serde_json::json;

    fn test_schema() -> Schema {
        let mut schema = Schema::new(1).with_kind(
            KindSchema::new(
                "Transaction",
                vec![
                    FieldDef::required("amount", FieldType::Int),
                    FieldDef::optional("note", FieldType::String),
                ],
            )
            .synced(),
        );
        schema.ensure_outbox();
        schema
    }

    fn pending_entry() -> Record {
        ChangeEntry::new("e1", 1000, 1, ChangeType::Create, "Transaction", "t1")
            .to_record()
            .unwrap()
    }

    #[test]
    fn create_empty_snapshot() {
        let snapshot = StoreSnapshot::new(1);
        assert_eq!(snapshot.format_version, SNAPSHOT_FORMAT_VERSION);
        assert_eq!(snapshot.schema_version, 1);
        assert_eq!(snapshot.record_count(), 0);
        assert_eq!(snapshot.pending_count(), 0);
    }

    #[test]
    fn add_and_get_record() {
        let mut snapshot = StoreSnapshot::new(1);
        snapshot.add_record(Record::new("t1", "Transaction", json!({"amount": 5})));

        assert_eq!(snapshot.record_count(), 1);
        let retrieved = snapshot.get_record("Transaction", "t1").unwrap();
        assert_eq!(retrieved.fields, json!({"amount": 5}));
    }

    #[test]
    fn json_roundtrip_keeps_pending_entries() {
        let mut snapshot = StoreSnapshot::new(1);
        snapshot.add_record(Record::new("t1", "Transaction", json!({"amount": 5})));
        snapshot.add_record(pending_entry());

        let json = snapshot.to_json().unwrap();
        let restored = StoreSnapshot::from_json(&json).unwrap();

        assert_eq!(snapshot, restored);
        assert_eq!(restored.pending_count(), 1);
    }

    #[test]
    fn deterministic_serialization() {
        let mut first = StoreSnapshot::new(1);
        let mut second = StoreSnapshot::new(1);

        let a = Record::new("t-a", "Transaction", json!({"amount": 1}));
        let b = Record::new("t-b", "Transaction", json!({"amount": 2}));

        first.add_record(a.clone());
        first.add_record(b.clone());
        second.add_record(b);
        second.add_record(a);

        assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    }

    #[test]
    fn validate_snapshot_success() {
        let mut snapshot = StoreSnapshot::new(1);
        snapshot.add_record(Record::new("t1", "Transaction", json!({"amount": 5})));
        snapshot.add_record(pending_entry());

        assert!(snapshot.validate(&test_schema()).is_ok());
    }

    #[test]
    fn validate_snapshot_schema_version_mismatch() {
        let snapshot = StoreSnapshot::new(99);

        let result = snapshot.validate(&test_schema());
        assert!(matches!(result, Err(Error::SchemaVersionMismatch { .. })));
    }

    #[test]
    fn validate_snapshot_unknown_kind() {
        let mut snapshot = StoreSnapshot::new(1);
        snapshot.add_record(Record::new("a1", "Account", json!({})));

        let result = snapshot.validate(&test_schema());
        assert!(matches!(result, Err(Error::KindNotFound(k)) if k == "Account"));
    }

    #[test]
    fn validate_snapshot_invalid_fields() {
        let mut snapshot = StoreSnapshot::new(1);
        snapshot.add_record(Record::new("t1", "Transaction", json!({"amount": "five"})));

        let result = snapshot.validate(&test_schema());
        assert!(matches!(result, Err(Error::TypeMismatch { .. })));
    }

    #[test]
    fn validate_snapshot_undecodable_entry() {
        let mut entry = pending_entry();
        entry.fields["changeType"] = json!("BOGUS");
        let mut snapshot = StoreSnapshot::new(1);
        snapshot.add_record(entry);

        let result = snapshot.validate(&test_schema());
        assert!(matches!(result, Err(Error::InvalidEntry { .. })));
    }

    #[test]
    fn validate_snapshot_misfiled_record() {
        let mut snapshot = StoreSnapshot::new(1);
        snapshot.kinds.entry("Transaction".into()).or_default().insert(
            "t2".into(),
            Record::new("t1", "Transaction", json!({"amount": 5})),
        );

        let result = snapshot.validate(&test_schema());
        assert!(matches!(result, Err(Error::InvalidSnapshot(_))));
    }

    #[test]
    fn snapshot_metadata() {
        let mut snapshot = StoreSnapshot::new(1);
        snapshot.add_record(Record::new("t1", "Transaction", json!({"amount": 5})));
        snapshot.add_record(pending_entry());

        let metadata: SnapshotMetadata = (&snapshot).into();

        assert_eq!(metadata.format_version, SNAPSHOT_FORMAT_VERSION);
        assert_eq!(metadata.schema_version, 1);
        assert_eq!(metadata.record_count, 2);
        assert_eq!(metadata.pending_count, 1);
    }

    #[test]
    fn reject_future_format_version() {
        let json = r#"{
            "formatVersion": 999,
            "schemaVersion": 1,
            "kinds": {}
        }"#;

        let result = StoreSnapshot::from_json(json);
        assert!(matches!(result, Err(Error::InvalidSnapshot(_))));
    }
}
