//! Schema definition and validation.
//!
//! Schemas declare the record kinds a datastore holds, validate records
//! before they are written, and flag which kinds take part in sync.

use crate::{entry::ChangeEntry, error::Result, Error, KindName, Record, SchemaVersion};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Field types supported in schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    Timestamp,
    /// Arbitrary nested JSON
    Json,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::String => write!(f, "String"),
            FieldType::Int => write!(f, "Int"),
            FieldType::Float => write!(f, "Float"),
            FieldType::Bool => write!(f, "Bool"),
            FieldType::Timestamp => write!(f, "Timestamp"),
            FieldType::Json => write!(f, "Json"),
        }
    }
}

/// Definition of a field in a record kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Field type
    pub field_type: FieldType,
    /// Whether this field is required
    pub required: bool,
}

impl FieldDef {
    /// Create a new required field definition.
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
        }
    }

    /// Create a new optional field definition.
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
        }
    }

    /// Validate a JSON value against this field definition.
    pub fn validate(&self, value: Option<&serde_json::Value>) -> Result<()> {
        match value {
            None | Some(serde_json::Value::Null) if self.required => {
                Err(Error::MissingRequiredField(self.name.clone()))
            }
            None | Some(serde_json::Value::Null) => Ok(()),
            Some(v) => self.validate_type(v),
        }
    }

    fn validate_type(&self, value: &serde_json::Value) -> Result<()> {
        let valid = match self.field_type {
            FieldType::String => value.is_string(),
            FieldType::Int => value.is_i64() || value.is_u64(),
            FieldType::Float => value.is_number(),
            FieldType::Bool => value.is_boolean(),
            FieldType::Timestamp => value.is_u64(),
            FieldType::Json => true,
        };

        if valid {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                field: self.name.clone(),
                expected: self.field_type.to_string(),
                got: json_type_name(value).to_string(),
            })
        }
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "Null",
        serde_json::Value::Bool(_) => "Bool",
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => "Int",
        serde_json::Value::Number(_) => "Float",
        serde_json::Value::String(_) => "String",
        serde_json::Value::Array(_) => "Array",
        serde_json::Value::Object(_) => "Object",
    }
}

/// Schema for one record kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindSchema {
    /// Kind name
    pub name: KindName,
    /// Field definitions
    pub fields: Vec<FieldDef>,
    /// Whether mutations of this kind are captured for sync
    #[serde(default)]
    pub synced: bool,
}

impl KindSchema {
    /// Create a new, non-synchronized kind schema.
    pub fn new(name: impl Into<KindName>, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.into(),
            fields,
            synced: false,
        }
    }

    /// Mark this kind as synchronized.
    pub fn synced(mut self) -> Self {
        self.synced = true;
        self
    }

    /// Validate a record's fields against this schema.
    pub fn validate_fields(&self, fields: &serde_json::Value) -> Result<()> {
        let obj = fields
            .as_object()
            .ok_or_else(|| Error::InvalidPayload("fields must be an object".into()))?;

        for field in &self.fields {
            field.validate(obj.get(&field.name))?;
        }

        Ok(())
    }
}

/// Schema for the entire datastore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Schema version for migrations
    pub version: SchemaVersion,
    /// Kind schemas by name
    pub kinds: BTreeMap<KindName, KindSchema>,
}

impl Schema {
    /// Create a new, empty schema.
    pub fn new(version: SchemaVersion) -> Self {
        Self {
            version,
            kinds: BTreeMap::new(),
        }
    }

    /// Add a kind to the schema, replacing any kind with the same name.
    pub fn add_kind(&mut self, kind: KindSchema) -> &mut Self {
        self.kinds.insert(kind.name.clone(), kind);
        self
    }

    /// Builder-style method to add a kind.
    pub fn with_kind(mut self, kind: KindSchema) -> Self {
        self.add_kind(kind);
        self
    }

    /// Declare the outbox kind if the schema does not already carry it.
    pub fn ensure_outbox(&mut self) -> &mut Self {
        if !self.kinds.contains_key(ChangeEntry::KIND) {
            self.add_kind(ChangeEntry::kind_schema());
        }
        self
    }

    /// Get a kind schema by name.
    pub fn get_kind(&self, name: &str) -> Option<&KindSchema> {
        self.kinds.get(name)
    }

    /// The whitelist of kinds flagged as synchronized.
    pub fn synced_kinds(&self) -> SyncedKinds {
        self.kinds
            .values()
            .filter(|k| k.synced)
            .map(|k| k.name.clone())
            .collect()
    }

    /// Validate a record against its kind's schema.
    ///
    /// Outbox rows must also decode as a [`ChangeEntry`].
    pub fn validate_record(&self, record: &Record) -> Result<()> {
        self.kinds
            .get(&record.kind)
            .ok_or_else(|| Error::KindNotFound(record.kind.clone()))?
            .validate_fields(&record.fields)?;
        if record.kind == ChangeEntry::KIND {
            ChangeEntry::from_record(record)?;
        }
        Ok(())
    }
}

/// The fixed set of record kinds whose mutations are captured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncedKinds(BTreeSet<KindName>);

impl SyncedKinds {
    /// Build a whitelist from kind names.
    pub fn new<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<KindName>,
    {
        Self(kinds.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.0.contains(kind)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KindName> {
        self.0.iter()
    }

    /// Reject whitelists that would capture the outbox's own writes.
    pub fn validate(&self) -> Result<()> {
        if self.contains(ChangeEntry::KIND) {
            return Err(Error::Config(format!(
                "{} is reserved for the outbox and cannot be synchronized",
                ChangeEntry::KIND
            )));
        }
        Ok(())
    }
}

impl<S: Into<KindName>> FromIterator<S> for SyncedKinds {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}
