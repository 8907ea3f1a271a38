//! Record types for storing data.

use crate::{KindName, RecordId};
use serde::{Deserialize, Serialize};

/// A record held by the datastore.
///
/// Records are schemaless JSON objects grouped by kind. The datastore keys
/// them by `id`; an empty id is storable but is never synchronized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Identifier, unique within its kind
    pub id: RecordId,
    /// Entity kind this record belongs to
    pub kind: KindName,
    /// The record's attributes (a JSON object)
    pub fields: serde_json::Value,
}

impl Record {
    /// Create a new record.
    pub fn new(
        id: impl Into<RecordId>,
        kind: impl Into<KindName>,
        fields: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            fields,
        }
    }

    /// Whether the record carries an addressable identifier.
    pub fn has_id(&self) -> bool {
        !self.id.trim().is_empty()
    }

    /// Look up a single attribute.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }
}
