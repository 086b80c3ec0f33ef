//! Entity catalog
//!
//! The catalog declares every normalized entity type the engine may build:
//! its fields and their semantic types, the fields forming its composite
//! identity, which fields are required before the entity counts as complete,
//! and (for child types) the entity type it belongs to. An ancestor may be an
//! abstract type; `abstract_types` declares the concrete subtypes each
//! abstract fans out to, and per-file mapping specs pick the concrete one via
//! `enforced_ancestor_types`.
//!
//! # Format
//! ```yaml
//! entities:
//!   state_person:
//!     fields:
//!       person_external_id: numeric_id
//!       surname: string
//!       birthdate: date
//!     primary_key: [person_external_id]
//!     required: [person_external_id]
//!   state_supervision_contact:
//!     ancestor: state_person
//!     fields:
//!       person_external_id: numeric_id
//!       contact_date: date
//!       contact_type: enum_code
//!     primary_key: [person_external_id, contact_date]
//!     required: [person_external_id, contact_date]
//! abstract_types:
//!   state_sentence: [state_supervision_sentence, state_incarceration_sentence]
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

/// Semantic type of one entity field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    String,
    EnumCode,
    Date,
    Boolean,
    NumericId,
}

impl SemanticType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticType::String => "string",
            SemanticType::EnumCode => "enum_code",
            SemanticType::Date => "date",
            SemanticType::Boolean => "boolean",
            SemanticType::NumericId => "numeric_id",
        }
    }
}

/// Schema for one entity type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntitySchema {
    /// Field name → semantic type
    pub fields: BTreeMap<String, SemanticType>,
    /// Ordered field names forming the composite identity
    pub primary_key: Vec<String>,
    /// Fields that must be populated before the entity is complete.
    /// Primary-key fields are implicitly required.
    #[serde(default)]
    pub required: Vec<String>,
    /// Entity type this one belongs to; may name an abstract type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ancestor: Option<String>,
}

impl EntitySchema {
    /// Semantic type of a field, if declared
    pub fn field_type(&self, field: &str) -> Option<SemanticType> {
        self.fields.get(field).copied()
    }

    /// All fields that must be non-null for completeness (primary key +
    /// declared required), deduplicated, in declaration order
    pub fn completeness_fields(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.primary_key
            .iter()
            .chain(self.required.iter())
            .filter(|f| seen.insert(f.as_str()))
            .map(String::as_str)
            .collect()
    }
}

/// Catalog file layout
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogFile {
    entities: BTreeMap<String, EntitySchema>,
    #[serde(default)]
    abstract_types: BTreeMap<String, BTreeSet<String>>,
}

/// Validated, immutable catalog of entity schemas and abstract type families
#[derive(Debug, Clone)]
pub struct EntityCatalog {
    entities: BTreeMap<String, EntitySchema>,
    abstract_types: BTreeMap<String, BTreeSet<String>>,
}

impl EntityCatalog {
    /// Load and validate a catalog from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate a catalog from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file: CatalogFile = serde_yaml::from_str(yaml)?;
        let catalog = Self {
            entities: file.entities,
            abstract_types: file.abstract_types,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    fn validate(&self) -> Result<()> {
        let config = |message: String| IngestError::config("entity catalog", message);

        if self.entities.is_empty() {
            return Err(config("catalog declares no entities".to_string()));
        }

        for (entity_type, schema) in &self.entities {
            if self.abstract_types.contains_key(entity_type) {
                return Err(config(format!(
                    "'{}' is declared both as an entity and as an abstract type",
                    entity_type
                )));
            }
            if schema.primary_key.is_empty() {
                return Err(config(format!(
                    "entity '{}' declares no primary_key",
                    entity_type
                )));
            }
            for field in schema.primary_key.iter().chain(schema.required.iter()) {
                if !schema.fields.contains_key(field) {
                    return Err(config(format!(
                        "entity '{}' references undeclared field '{}'",
                        entity_type, field
                    )));
                }
            }
            if let Some(ancestor) = &schema.ancestor {
                let known = self.entities.contains_key(ancestor)
                    || self.abstract_types.contains_key(ancestor);
                if !known {
                    return Err(config(format!(
                        "entity '{}' names unknown ancestor '{}'",
                        entity_type, ancestor
                    )));
                }
            }
        }

        for (abstract_type, subtypes) in &self.abstract_types {
            if subtypes.is_empty() {
                return Err(config(format!(
                    "abstract type '{}' declares no concrete subtypes",
                    abstract_type
                )));
            }
            for subtype in subtypes {
                if !self.entities.contains_key(subtype) {
                    return Err(config(format!(
                        "abstract type '{}' names unknown subtype '{}'",
                        abstract_type, subtype
                    )));
                }
            }
        }

        Ok(())
    }

    /// Schema for a concrete entity type
    pub fn get(&self, entity_type: &str) -> Option<&EntitySchema> {
        self.entities.get(entity_type)
    }

    /// Whether the name is a declared abstract type
    pub fn is_abstract(&self, name: &str) -> bool {
        self.abstract_types.contains_key(name)
    }

    /// Concrete subtypes of an abstract type
    pub fn concrete_subtypes(&self, abstract_type: &str) -> Option<&BTreeSet<String>> {
        self.abstract_types.get(abstract_type)
    }

    /// All declared entity types, in sorted order
    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }
}
