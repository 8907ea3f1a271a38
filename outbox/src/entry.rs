//! Change entries: the unit stored in the outbox.
//!
//! An entry records that a synchronized record was created, updated or
//! deleted, and when. Entries are persisted as ordinary datastore records of
//! the reserved kind [`ChangeEntry::KIND`], so they commit and roll back with
//! the mutation that produced them.

use crate::{
    error::Result,
    schema::{FieldDef, FieldType, KindSchema},
    Error, KindName, Record, RecordId, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Unique identifier for a change entry.
pub type EntryId = String;

/// The kind of mutation a change entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Create => "CREATE",
            ChangeType::Update => "UPDATE",
            ChangeType::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `(changeType, recordType, recordId)` triple used to suppress
/// redundant pending entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey<'a> {
    pub change_type: ChangeType,
    pub record_type: &'a str,
    pub record_id: &'a str,
}

impl DedupKey<'_> {
    /// Whether an encoded outbox record carries this key.
    pub fn matches_record(&self, record: &Record) -> bool {
        let field = |name: &str| record.fields.get(name).and_then(serde_json::Value::as_str);
        field("changeType") == Some(self.change_type.as_str())
            && field("recordType") == Some(self.record_type)
            && field("recordId") == Some(self.record_id)
    }
}

/// A captured mutation awaiting synchronization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEntry {
    /// Entry ID, generated at enqueue time
    pub id: EntryId,
    /// Wall-clock milliseconds at enqueue time
    pub change_time: Timestamp,
    /// Insertion sequence among pending entries
    pub seq: u64,
    /// What happened to the record
    pub change_type: ChangeType,
    /// Kind of the mutated record
    pub record_type: KindName,
    /// ID of the mutated record
    pub record_id: RecordId,
}

impl ChangeEntry {
    /// Reserved datastore kind holding pending entries.
    pub const KIND: &'static str = "SyncQueueEntry";

    /// Create a new change entry.
    pub fn new(
        id: impl Into<EntryId>,
        change_time: Timestamp,
        seq: u64,
        change_type: ChangeType,
        record_type: impl Into<KindName>,
        record_id: impl Into<RecordId>,
    ) -> Self {
        Self {
            id: id.into(),
            change_time,
            seq,
            change_type,
            record_type: record_type.into(),
            record_id: record_id.into(),
        }
    }

    /// Schema declaration for the outbox kind.
    pub fn kind_schema() -> KindSchema {
        KindSchema::new(
            Self::KIND,
            vec![
                FieldDef::required("id", FieldType::String),
                FieldDef::required("changeTime", FieldType::Timestamp),
                FieldDef::required("seq", FieldType::Int),
                FieldDef::required("changeType", FieldType::String),
                FieldDef::required("recordType", FieldType::String),
                FieldDef::required("recordId", FieldType::String),
            ],
        )
    }

    /// The dedup key of this entry.
    pub fn key(&self) -> DedupKey<'_> {
        DedupKey {
            change_type: self.change_type,
            record_type: &self.record_type,
            record_id: &self.record_id,
        }
    }

    /// Sync order: `changeTime`, then insertion sequence, then ID.
    pub fn queue_order(&self, other: &Self) -> Ordering {
        self.change_time
            .cmp(&other.change_time)
            .then(self.seq.cmp(&other.seq))
            .then_with(|| self.id.cmp(&other.id))
    }

    /// Encode as a datastore record.
    pub fn to_record(&self) -> Result<Record> {
        let fields = serde_json::to_value(self).map_err(|e| Error::InvalidEntry {
            id: self.id.clone(),
            reason: e.to_string(),
        })?;
        Ok(Record::new(self.id.clone(), Self::KIND, fields))
    }

    /// Decode from a datastore record of the outbox kind.
    ///
    /// The entry's `id` field must equal the record ID, since acknowledgement
    /// deletes by entry ID.
    pub fn from_record(record: &Record) -> Result<Self> {
        if record.kind != Self::KIND {
            return Err(Error::InvalidEntry {
                id: record.id.clone(),
                reason: format!("expected kind {}, got {}", Self::KIND, record.kind),
            });
        }
        let entry: Self =
            serde_json::from_value(record.fields.clone()).map_err(|e| Error::InvalidEntry {
                id: record.id.clone(),
                reason: e.to_string(),
            })?;
        if entry.id != record.id {
            return Err(Error::InvalidEntry {
                id: record.id.clone(),
                reason: format!("entry id {} does not match record id", entry.id),
            });
        }
        Ok(entry)
    }
}

/// The insertion sequence of an encoded outbox record.
pub(crate) fn record_seq(record: &Record) -> Option<u64> {
    record.fields.get("seq").and_then(serde_json::Value::as_u64)
}

/// Sort entries into sync order.
pub fn sort_for_sync(entries: &mut [ChangeEntry]) {
    entries.sort_by(ChangeEntry::queue_order);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Schema;
    use serde_json::json;

    fn entry(id: &str, change_time: Timestamp, seq: u64) -> ChangeEntry {
        ChangeEntry::new(id, change_time, seq, ChangeType::Create, "Transaction", "t1")
    }

    #[test]
    fn change_type_wire_names() {
        assert_eq!(
            serde_json::to_value(ChangeType::Create).unwrap(),
            json!("CREATE")
        );
        assert_eq!(ChangeType::Delete.to_string(), "DELETE");
    }

    #[test]
    fn record_uses_camel_case_fields() {
        let record = entry("e1", 100, 1).to_record().unwrap();
        assert_eq!(record.id, "e1");
        assert_eq!(record.kind, ChangeEntry::KIND);
        assert_eq!(
            record.fields,
            json!({
                "id": "e1",
                "changeTime": 100,
                "seq": 1,
                "changeType": "CREATE",
                "recordType": "Transaction",
                "recordId": "t1",
            })
        );
    }

    #[test]
    fn encoded_record_matches_kind_schema() {
        let mut schema = Schema::new(1);
        schema.ensure_outbox();
        let record = entry("e1", 100, 1).to_record().unwrap();
        assert!(schema.validate_record(&record).is_ok());
    }

    #[test]
    fn decode_from_record() {
        let original = entry("e1", 100, 1);
        let decoded = ChangeEntry::from_record(&original.to_record().unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn decode_rejects_other_kinds() {
        let record = Record::new("t1", "Transaction", json!({"amount": 1}));
        assert!(matches!(
            ChangeEntry::from_record(&record),
            Err(Error::InvalidEntry { id, .. }) if id == "t1"
        ));
    }

    #[test]
    fn decode_rejects_malformed_fields() {
        let record = Record::new("e1", ChangeEntry::KIND, json!({"id": "e1"}));
        assert!(matches!(
            ChangeEntry::from_record(&record),
            Err(Error::InvalidEntry { .. })
        ));
    }

    #[test]
    fn decode_rejects_unknown_change_type() {
        let mut record = entry("e1", 100, 1).to_record().unwrap();
        record.fields["changeType"] = json!("BOGUS");
        assert!(matches!(
            ChangeEntry::from_record(&record),
            Err(Error::InvalidEntry { id, .. }) if id == "e1"
        ));
    }

    #[test]
    fn decode_rejects_mismatched_id() {
        let mut record = entry("e1", 100, 1).to_record().unwrap();
        record.fields["id"] = json!("other");
        assert!(matches!(
            ChangeEntry::from_record(&record),
            Err(Error::InvalidEntry { id, .. }) if id == "e1"
        ));
    }

    #[test]
    fn outbox_schema_rejects_undecodable_rows() {
        let mut schema = Schema::new(1);
        schema.ensure_outbox();
        let mut record = entry("e1", 100, 1).to_record().unwrap();
        record.fields["changeType"] = json!("BOGUS");
        assert!(schema.validate_record(&record).is_err());
    }

    #[test]
    fn dedup_key_matches_encoded_record() {
        let record = entry("e1", 100, 7).to_record().unwrap();
        let key = DedupKey {
            change_type: ChangeType::Create,
            record_type: "Transaction",
            record_id: "t1",
        };
        assert!(key.matches_record(&record));
        assert_eq!(record_seq(&record), Some(7));

        let other = DedupKey {
            change_type: ChangeType::Delete,
            ..key
        };
        assert!(!other.matches_record(&record));
    }

    #[test]
    fn order_by_change_time_first() {
        let mut entries = vec![entry("a", 100, 1), entry("b", 50, 2), entry("c", 75, 3)];
        sort_for_sync(&mut entries);
        let ids: Vec<_> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["b", "c", "a"]);
    }

    #[test]
    fn equal_times_fall_back_to_sequence_then_id() {
        let mut entries = vec![entry("z", 100, 2), entry("y", 100, 1), entry("x", 100, 2)];
        sort_for_sync(&mut entries);
        let ids: Vec<_> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["y", "x", "z"]);
    }

    #[test]
    fn dedup_key_includes_change_type() {
        let create = entry("a", 1, 1);
        let mut update = entry("b", 2, 2);
        update.change_type = ChangeType::Update;
        assert_ne!(create.key(), update.key());

        let again = entry("c", 3, 3);
        assert_eq!(create.key(), again.key());
    }
}
