//! Column binding resolution
//!
//! Marries a file's actual header to its mapping specification. Every header
//! column must resolve to exactly one outcome (a field on the primary
//! entity, a field on a child entity, or an explicit ignore) and the
//! resolution fails closed: a column the mapping knows nothing about aborts
//! the file's ingest before a single row is processed.
//!
//! Ancestor constraints are resolved here too, because they are a static
//! property of mapping + catalog: surfacing them before row streaming keeps
//! stale-mapping failures cheap.

use std::collections::BTreeMap;

use crate::error::{IngestError, Result};
use crate::manifest::FileConfig;
use crate::mapping::MappingSpec;
use crate::schema::EntityCatalog;

/// Resolved outcome for one raw column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnBinding {
    /// Field on the file's primary entity; `is_key` marks a component of the
    /// entity's composite identity
    Field {
        entity_type: String,
        field: String,
        is_key: bool,
    },
    /// Field on a child entity built from the same row
    ChildField { entity_type: String, field: String },
    /// Explicitly excluded from mapping
    Ignored,
}

/// Immutable table of resolved bindings for one file's header.
///
/// Built once per (file tag, header) and shared read-only by every
/// row-processing worker.
#[derive(Debug, Clone)]
pub struct BindingSet {
    pub file_tag: String,
    pub primary_entity: String,
    /// Raw columns forming the primary entity's identity, in declared order
    pub key_columns: Vec<String>,
    /// Child entity type → concrete parent entity type it links to
    pub resolved_ancestors: BTreeMap<String, String>,
    bindings: BTreeMap<String, ColumnBinding>,
}

impl BindingSet {
    /// Resolve every header column of `file_tag` against its mapping spec.
    pub fn resolve(
        config: &FileConfig,
        mapping: &MappingSpec,
        catalog: &EntityCatalog,
        header: &[String],
    ) -> Result<Self> {
        let file_tag = &config.file_tag;
        let ignored = mapping.ignored_columns();

        let mut bindings = BTreeMap::new();
        for column in header {
            let binding = if let Some(target) = mapping.key_mappings.get(column) {
                ColumnBinding::Field {
                    entity_type: target.entity_type.clone(),
                    field: target.field.clone(),
                    is_key: mapping.primary_key.contains(column),
                }
            } else if let Some(target) = mapping.child_key_mappings.get(column) {
                ColumnBinding::ChildField {
                    entity_type: target.entity_type.clone(),
                    field: target.field.clone(),
                }
            } else if ignored.contains(column.as_str()) {
                ColumnBinding::Ignored
            } else {
                return Err(IngestError::UnmappedColumn {
                    file_tag: file_tag.clone(),
                    column: column.clone(),
                });
            };
            bindings.insert(column.clone(), binding);
        }

        // Identity columns must actually be present in this dump.
        for column in &mapping.primary_key {
            if !header.iter().any(|h| h == column) {
                return Err(IngestError::MissingKeyColumn {
                    file_tag: file_tag.clone(),
                    column: column.clone(),
                });
            }
        }

        // Resolve each child type's ancestor to a concrete parent type.
        let mut resolved_ancestors = BTreeMap::new();
        for child_type in mapping.child_entity_types() {
            let child_schema = catalog.get(child_type).ok_or_else(|| {
                IngestError::config(
                    file_tag,
                    format!("child entity '{}' is not in the catalog", child_type),
                )
            })?;
            let ancestor = child_schema.ancestor.as_deref().ok_or_else(|| {
                IngestError::config(
                    file_tag,
                    format!("child entity '{}' declares no ancestor", child_type),
                )
            })?;

            let concrete = if catalog.is_abstract(ancestor) {
                mapping
                    .enforced_ancestor_types
                    .get(ancestor)
                    .cloned()
                    .ok_or_else(|| IngestError::UnresolvedAncestorType {
                        file_tag: file_tag.clone(),
                        child_type: child_type.to_string(),
                        abstract_type: ancestor.to_string(),
                    })?
            } else {
                ancestor.to_string()
            };

            // The parent must be the entity this file actually builds,
            // otherwise the child link can never be recorded.
            if concrete != mapping.primary_entity {
                return Err(IngestError::config(
                    file_tag,
                    format!(
                        "child '{}' links to '{}', but this file builds '{}'",
                        child_type, concrete, mapping.primary_entity
                    ),
                ));
            }

            resolved_ancestors.insert(child_type.to_string(), concrete);
        }

        Ok(Self {
            file_tag: file_tag.clone(),
            primary_entity: mapping.primary_entity.clone(),
            key_columns: mapping.primary_key.clone(),
            resolved_ancestors,
            bindings,
        })
    }

    /// Binding for one column, if the column was in the header
    pub fn binding(&self, column: &str) -> Option<&ColumnBinding> {
        self.bindings.get(column)
    }

    /// Iterate over (column, binding) pairs in column order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnBinding)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of resolved columns
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
