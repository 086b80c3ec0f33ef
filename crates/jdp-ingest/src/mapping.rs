//! Per-file mapping specifications
//!
//! One mapping spec per file tag declares how raw columns become entity
//! fields. A column is either a parent binding (`key_mappings`), a child
//! binding (`child_key_mappings`), or explicitly ignored (`keys_to_ignore`,
//! each entry carrying the reason the column is excluded). `primary_key`
//! names the key_mappings columns that form the primary entity's identity,
//! and `enforced_ancestor_types` picks the concrete subtype for any abstract
//! ancestor a child type declares.
//!
//! # Format
//! ```yaml
//! file_tag: sprvsn_cntc
//! primary_entity: state_person
//! key_mappings:
//!   ofndr_num: state_person.person_external_id
//! child_key_mappings:
//!   cntc_dt: state_supervision_contact.contact_date
//!   cntc_typ_desc: state_supervision_contact.contact_type
//! primary_key:
//!   - ofndr_num
//! keys_to_ignore:
//!   - column: lan_id
//!     reason: agent login id, never ingested
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};
use crate::schema::EntityCatalog;

/// A `entity_type.field` target written in a mapping file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldRef {
    pub entity_type: String,
    pub field: String,
}

impl TryFrom<String> for FieldRef {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        match value.split_once('.') {
            Some((entity_type, field)) if !entity_type.is_empty() && !field.is_empty() => {
                Ok(Self {
                    entity_type: entity_type.to_string(),
                    field: field.to_string(),
                })
            },
            _ => Err(format!(
                "expected 'entity_type.field', got '{}'",
                value
            )),
        }
    }
}

impl From<FieldRef> for String {
    fn from(value: FieldRef) -> Self {
        format!("{}.{}", value.entity_type, value.field)
    }
}

impl std::fmt::Display for FieldRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.entity_type, self.field)
    }
}

/// An ignored column, conventionally annotated with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IgnoreEntry {
    /// Bare column name
    Bare(String),
    /// Column with a documented exclusion reason
    Annotated {
        column: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl IgnoreEntry {
    pub fn column(&self) -> &str {
        match self {
            IgnoreEntry::Bare(column) => column,
            IgnoreEntry::Annotated { column, .. } => column,
        }
    }
}

/// Mapping specification for one file tag
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingSpec {
    pub file_tag: String,
    /// Entity type the file's parent bindings construct
    pub primary_entity: String,
    /// Raw column → field on the primary entity
    #[serde(default)]
    pub key_mappings: BTreeMap<String, FieldRef>,
    /// Raw column → field on a child entity built from the same row
    #[serde(default)]
    pub child_key_mappings: BTreeMap<String, FieldRef>,
    /// key_mappings columns forming the primary entity's identity, in order
    pub primary_key: Vec<String>,
    /// Abstract ancestor type → concrete subtype enforced for this file
    #[serde(default)]
    pub enforced_ancestor_types: BTreeMap<String, String>,
    /// Columns deliberately excluded from mapping
    #[serde(default)]
    pub keys_to_ignore: Vec<IgnoreEntry>,
}

impl MappingSpec {
    /// Load a mapping spec from a YAML file (validation happens separately,
    /// against the entity catalog)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse a mapping spec from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// The set of explicitly ignored columns
    pub fn ignored_columns(&self) -> BTreeSet<&str> {
        self.keys_to_ignore.iter().map(IgnoreEntry::column).collect()
    }

    /// Every child entity type this file produces
    pub fn child_entity_types(&self) -> BTreeSet<&str> {
        self.child_key_mappings
            .values()
            .map(|target| target.entity_type.as_str())
            .collect()
    }

    /// Cross-check this mapping against the entity catalog.
    ///
    /// All violations here are configuration errors: they fail the region
    /// load before any row is processed.
    pub fn validate(&self, catalog: &EntityCatalog) -> Result<()> {
        let config = |message: String| {
            IngestError::config(
                format!("mapping '{}'", self.file_tag),
                message,
            )
        };

        if self.primary_key.is_empty() {
            return Err(config("primary_key must not be empty".to_string()));
        }

        let primary_schema = catalog
            .get(&self.primary_entity)
            .ok_or_else(|| config(format!("unknown primary_entity '{}'", self.primary_entity)))?;

        let ignored = self.ignored_columns();

        // A column cannot be both mapped and ignored, or mapped twice.
        for column in self.key_mappings.keys() {
            if ignored.contains(column.as_str()) {
                return Err(config(format!(
                    "column '{}' is both mapped and ignored",
                    column
                )));
            }
            if self.child_key_mappings.contains_key(column) {
                return Err(config(format!(
                    "column '{}' appears in both key_mappings and child_key_mappings",
                    column
                )));
            }
        }
        for column in self.child_key_mappings.keys() {
            if ignored.contains(column.as_str()) {
                return Err(config(format!(
                    "column '{}' is both mapped and ignored",
                    column
                )));
            }
        }

        // Parent bindings must target declared fields of the primary entity.
        for (column, target) in &self.key_mappings {
            if target.entity_type != self.primary_entity {
                return Err(config(format!(
                    "key_mappings column '{}' targets '{}', expected primary entity '{}'",
                    column, target.entity_type, self.primary_entity
                )));
            }
            if primary_schema.field_type(&target.field).is_none() {
                return Err(config(format!(
                    "key_mappings column '{}' targets unknown field '{}'",
                    column, target
                )));
            }
        }

        // Child bindings must target declared fields of known child types,
        // and a child type must declare an ancestor to link through.
        for (column, target) in &self.child_key_mappings {
            if target.entity_type == self.primary_entity {
                return Err(config(format!(
                    "child_key_mappings column '{}' targets the primary entity '{}'",
                    column, self.primary_entity
                )));
            }
            let child_schema = catalog.get(&target.entity_type).ok_or_else(|| {
                config(format!(
                    "child_key_mappings column '{}' targets unknown entity '{}'",
                    column, target.entity_type
                ))
            })?;
            if child_schema.field_type(&target.field).is_none() {
                return Err(config(format!(
                    "child_key_mappings column '{}' targets unknown field '{}'",
                    column, target
                )));
            }
            if child_schema.ancestor.is_none() {
                return Err(config(format!(
                    "child entity '{}' declares no ancestor to link through",
                    target.entity_type
                )));
            }
        }

        // The declared identity must be made of key_mappings columns, and a
        // column cannot simultaneously be ignored and a key component.
        for column in &self.primary_key {
            if ignored.contains(column.as_str()) {
                return Err(config(format!(
                    "column '{}' is both in keys_to_ignore and primary_key",
                    column
                )));
            }
            if !self.key_mappings.contains_key(column) {
                return Err(config(format!(
                    "primary_key column '{}' is not bound in key_mappings",
                    column
                )));
            }
        }

        // The identity columns must cover exactly the primary entity's
        // declared key fields.
        let mapped_key_fields: BTreeSet<&str> = self
            .primary_key
            .iter()
            .filter_map(|column| self.key_mappings.get(column))
            .map(|target| target.field.as_str())
            .collect();
        let schema_key_fields: BTreeSet<&str> = primary_schema
            .primary_key
            .iter()
            .map(String::as_str)
            .collect();
        if mapped_key_fields != schema_key_fields {
            return Err(config(format!(
                "primary_key columns map to fields {:?}, but entity '{}' declares identity {:?}",
                mapped_key_fields, self.primary_entity, schema_key_fields
            )));
        }

        // Enforcements must pair a declared abstract with one of its subtypes.
        for (abstract_type, concrete) in &self.enforced_ancestor_types {
            let subtypes = catalog.concrete_subtypes(abstract_type).ok_or_else(|| {
                config(format!(
                    "enforced_ancestor_types names unknown abstract type '{}'",
                    abstract_type
                ))
            })?;
            if !subtypes.contains(concrete) {
                return Err(config(format!(
                    "'{}' is not a declared subtype of '{}'",
                    concrete, abstract_type
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
entities:
  state_person:
    fields:
      person_external_id: numeric_id
      surname: string
    primary_key: [person_external_id]
  state_supervision_contact:
    ancestor: state_person
    fields:
      contact_date: date
      contact_type: enum_code
    primary_key: [contact_date]
abstract_types: {}
"#;

    const MAPPING: &str = r#"
file_tag: sprvsn_cntc
primary_entity: state_person
key_mappings:
  ofndr_num: state_person.person_external_id
child_key_mappings:
  cntc_dt: state_supervision_contact.contact_date
  cntc_typ_desc: state_supervision_contact.contact_type
primary_key:
  - ofndr_num
keys_to_ignore:
  - column: lan_id
    reason: agent login id, never ingested
  - updt_dt
"#;

    fn catalog() -> EntityCatalog {
        EntityCatalog::from_yaml_str(CATALOG).unwrap()
    }

    #[test]
    fn test_parse_and_validate() {
        let spec = MappingSpec::from_yaml_str(MAPPING).unwrap();
        spec.validate(&catalog()).unwrap();

        assert_eq!(spec.primary_entity, "state_person");
        assert_eq!(
            spec.key_mappings["ofndr_num"],
            FieldRef {
                entity_type: "state_person".to_string(),
                field: "person_external_id".to_string()
            }
        );
        assert_eq!(
            spec.ignored_columns(),
            ["lan_id", "updt_dt"].into_iter().collect()
        );
        assert_eq!(
            spec.child_entity_types(),
            ["state_supervision_contact"].into_iter().collect()
        );
    }

    #[test]
    fn test_field_ref_rejects_missing_dot() {
        let err = FieldRef::try_from("state_person".to_string()).unwrap_err();
        assert!(err.contains("entity_type.field"));
    }

    #[test]
    fn test_ignored_primary_key_column_is_config_error() {
        let yaml = r#"
file_tag: sprvsn_cntc
primary_entity: state_person
key_mappings:
  ofndr_num: state_person.person_external_id
primary_key: [ofndr_num]
keys_to_ignore: [ofndr_num]
"#;
        let spec = MappingSpec::from_yaml_str(yaml).unwrap();
        let err = spec.validate(&catalog()).unwrap_err();
        assert!(err
            .to_string()
            .contains("both mapped and ignored"));
    }

    #[test]
    fn test_primary_key_must_be_bound() {
        let yaml = r#"
file_tag: sprvsn_cntc
primary_entity: state_person
key_mappings:
  ofndr_num: state_person.person_external_id
primary_key: [body_loc_cd]
"#;
        let spec = MappingSpec::from_yaml_str(yaml).unwrap();
        let err = spec.validate(&catalog()).unwrap_err();
        assert!(err.to_string().contains("not bound in key_mappings"));
    }

    #[test]
    fn test_key_mapping_must_target_primary_entity() {
        let yaml = r#"
file_tag: sprvsn_cntc
primary_entity: state_person
key_mappings:
  cntc_dt: state_supervision_contact.contact_date
primary_key: [cntc_dt]
"#;
        let spec = MappingSpec::from_yaml_str(yaml).unwrap();
        let err = spec.validate(&catalog()).unwrap_err();
        assert!(err.to_string().contains("expected primary entity"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = r#"
file_tag: sprvsn_cntc
primary_entity: state_person
key_mappings:
  ofndr_num: state_person.person_external_id
  agnt_name: state_person.agent_name
primary_key: [ofndr_num]
"#;
        let spec = MappingSpec::from_yaml_str(yaml).unwrap();
        let err = spec.validate(&catalog()).unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn test_identity_must_cover_schema_key() {
        let yaml = r#"
file_tag: sprvsn_cntc
primary_entity: state_person
key_mappings:
  ofndr_num: state_person.person_external_id
  name: state_person.surname
primary_key: [name]
"#;
        let spec = MappingSpec::from_yaml_str(yaml).unwrap();
        let err = spec.validate(&catalog()).unwrap_err();
        assert!(err.to_string().contains("declares identity"));
    }
}
