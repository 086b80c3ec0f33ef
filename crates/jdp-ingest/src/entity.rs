//! Normalized entity instances
//!
//! Entities are dynamic: their shape comes from the entity catalog, not from
//! Rust structs, so one engine serves every region. An entity's identity is
//! `(entity_type, primary key tuple)`; its fields hold typed values coerced
//! from raw cells during graph construction.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::schema::EntitySchema;

/// A typed field value on a normalized entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    /// Raw enum code, preserved verbatim; decoding region code books is a
    /// downstream concern
    Code(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Bool(bool),
    Id(i64),
    Null,
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Canonical string form used inside primary key tuples
    pub fn key_component(&self) -> Option<String> {
        match self {
            FieldValue::Text(s) | FieldValue::Code(s) => Some(s.clone()),
            FieldValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            FieldValue::DateTime(ts) => Some(ts.format("%Y-%m-%d %H:%M:%S").to_string()),
            FieldValue::Bool(b) => Some(b.to_string()),
            FieldValue::Id(id) => Some(id.to_string()),
            FieldValue::Null => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.key_component() {
            Some(s) => write!(f, "{}", s),
            None => write!(f, "null"),
        }
    }
}

/// Identity of one entity: type plus primary key tuple
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub entity_type: String,
    pub key: Vec<String>,
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.entity_type, self.key.join(", "))
    }
}

/// Lifecycle state of an entity within a run.
///
/// `Complete` (all completeness fields populated) is terminal: the merge
/// policy never erases a populated field, so an entity cannot regress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    Partial,
    Complete,
}

/// One normalized entity instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: String,
    pub fields: BTreeMap<String, FieldValue>,
    /// Primary key tuple, in the schema's declared field order
    pub key: Vec<String>,
}

impl Entity {
    /// Identity of this entity
    pub fn identity(&self) -> EntityKey {
        EntityKey {
            entity_type: self.entity_type.clone(),
            key: self.key.clone(),
        }
    }

    /// Value of a field, `Null` when never observed
    pub fn field(&self, name: &str) -> &FieldValue {
        self.fields.get(name).unwrap_or(&FieldValue::Null)
    }

    /// Lifecycle state against the entity's schema
    pub fn state(&self, schema: &EntitySchema) -> EntityState {
        let complete = schema
            .completeness_fields()
            .iter()
            .all(|field| !self.field(field).is_null());
        if complete {
            EntityState::Complete
        } else {
            EntityState::Partial
        }
    }

    /// Compute the primary key tuple from populated fields.
    ///
    /// Returns the name of the first unpopulated key field on failure.
    pub fn compute_key(
        fields: &BTreeMap<String, FieldValue>,
        schema: &EntitySchema,
    ) -> std::result::Result<Vec<String>, String> {
        schema
            .primary_key
            .iter()
            .map(|field| {
                fields
                    .get(field)
                    .and_then(FieldValue::key_component)
                    .ok_or_else(|| field.clone())
            })
            .collect()
    }
}
