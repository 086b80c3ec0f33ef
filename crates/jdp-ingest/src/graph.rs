//! Entity graph construction
//!
//! Converts one normalized row into its atomic contribution to the entity
//! graph: the primary entity, any child entities the row observes, and the
//! child→parent edges linking them. The same raw column can feed the parent's
//! identity and a child's foreign key. The child link is derived from the
//! parent's computed identity, never from naming coincidence, and each link
//! is carried as an explicit edge descriptor.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::bindings::{BindingSet, ColumnBinding};
use crate::entity::{Entity, EntityKey, FieldValue};
use crate::error::{IngestError, Result, RowError};
use crate::normalize::{parse_datetime, CellValue, NormalizedRow};
use crate::schema::{EntityCatalog, EntitySchema, SemanticType};

/// A child→parent link in the entity graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub child: EntityKey,
    pub parent: EntityKey,
}

/// Everything one row adds to the graph.
///
/// Applied atomically by the merge store: entities first, then edges, so a
/// cancelled run never records an edge without its endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowContribution {
    pub file_tag: String,
    pub ordinal: u64,
    /// Primary entity first, children after
    pub entities: Vec<Entity>,
    pub edges: Vec<Edge>,
}

impl RowContribution {
    /// True when the row touched no entity (every column ignored)
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    ParentField,
    ChildField,
}

#[derive(Debug, Clone)]
struct BoundColumn {
    column: String,
    entity_type: String,
    field: String,
    semantic: SemanticType,
    role: Role,
}

/// Builds [`RowContribution`]s from normalized rows.
///
/// Pure: shared freely across row-processing workers.
pub struct EntityGraphBuilder<'a> {
    bindings: &'a BindingSet,
    parent_schema: &'a EntitySchema,
    child_schemas: BTreeMap<String, &'a EntitySchema>,
    plan: Vec<BoundColumn>,
}

impl<'a> EntityGraphBuilder<'a> {
    /// Flatten the binding set into a column plan.
    ///
    /// All schema lookups happen here, once, so per-row construction cannot
    /// hit a missing type or field.
    pub fn new(bindings: &'a BindingSet, catalog: &'a EntityCatalog) -> Result<Self> {
        let parent_schema = catalog.get(&bindings.primary_entity).ok_or_else(|| {
            IngestError::config(
                &bindings.file_tag,
                format!("unknown primary entity '{}'", bindings.primary_entity),
            )
        })?;

        let mut child_schemas = BTreeMap::new();
        let mut plan = Vec::with_capacity(bindings.len());
        for (column, binding) in bindings.iter() {
            let (entity_type, field, role) = match binding {
                ColumnBinding::Field { entity_type, field, .. } => {
                    (entity_type, field, Role::ParentField)
                },
                ColumnBinding::ChildField { entity_type, field } => {
                    (entity_type, field, Role::ChildField)
                },
                ColumnBinding::Ignored => continue,
            };

            let schema = if role == Role::ParentField {
                parent_schema
            } else {
                let schema = catalog.get(entity_type).ok_or_else(|| {
                    IngestError::config(
                        &bindings.file_tag,
                        format!("unknown child entity '{}'", entity_type),
                    )
                })?;
                child_schemas.insert(entity_type.clone(), schema);
                schema
            };
            let semantic = schema.field_type(field).ok_or_else(|| {
                IngestError::config(
                    &bindings.file_tag,
                    format!("'{}' has no field '{}'", entity_type, field),
                )
            })?;

            plan.push(BoundColumn {
                column: column.to_string(),
                entity_type: entity_type.clone(),
                field: field.clone(),
                semantic,
                role,
            });
        }

        Ok(Self {
            bindings,
            parent_schema,
            child_schemas,
            plan,
        })
    }

    /// Build the row's contribution to the entity graph
    pub fn build(&self, row: &NormalizedRow) -> std::result::Result<RowContribution, RowError> {
        if self.plan.is_empty() {
            // A row of pure noise: legal, flagged by the caller.
            return Ok(RowContribution {
                file_tag: row.file_tag.clone(),
                ordinal: row.ordinal,
                entities: Vec::new(),
                edges: Vec::new(),
            });
        }

        let mut parent_fields: BTreeMap<String, FieldValue> = BTreeMap::new();
        let mut child_fields: BTreeMap<&str, BTreeMap<String, FieldValue>> = BTreeMap::new();

        for bound in &self.plan {
            let cell = row.value(&bound.column);
            let value = coerce(cell, bound.semantic).map_err(|value| RowError::Coerce {
                file_tag: row.file_tag.clone(),
                row: row.ordinal,
                column: bound.column.clone(),
                value,
                semantic: bound.semantic.as_str().to_string(),
            })?;
            match bound.role {
                Role::ParentField => {
                    parent_fields.insert(bound.field.clone(), value);
                },
                Role::ChildField => {
                    child_fields
                        .entry(bound.entity_type.as_str())
                        .or_default()
                        .insert(bound.field.clone(), value);
                },
            }
        }

        let parent_key =
            Entity::compute_key(&parent_fields, self.parent_schema).map_err(|field| {
                RowError::MissingPrimaryKey {
                    file_tag: row.file_tag.clone(),
                    row: row.ordinal,
                    column: self.column_for_parent_field(&field),
                }
            })?;
        let parent = Entity {
            entity_type: self.bindings.primary_entity.clone(),
            fields: parent_fields,
            key: parent_key,
        };
        let parent_identity = parent.identity();

        let mut entities = vec![parent];
        let mut edges = Vec::new();

        for (child_type, mut fields) in child_fields {
            // A child whose every bound field is null was not observed by
            // this row; emit nothing for it.
            if fields.values().all(FieldValue::is_null) {
                continue;
            }
            let schema = self.child_schemas[child_type];

            // Propagate parent identity fields shared by name (the raw key
            // column binds once, to the parent; the child inherits it).
            for key_field in &self.parent_schema.primary_key {
                let inherited = schema.field_type(key_field).is_some()
                    && fields.get(key_field).map(FieldValue::is_null).unwrap_or(true);
                if inherited {
                    if let Some(value) = entities[0].fields.get(key_field) {
                        fields.insert(key_field.clone(), value.clone());
                    }
                }
            }

            let key = Entity::compute_key(&fields, schema).map_err(|field| {
                RowError::MissingPrimaryKey {
                    file_tag: row.file_tag.clone(),
                    row: row.ordinal,
                    column: field,
                }
            })?;
            let child = Entity {
                entity_type: child_type.to_string(),
                fields,
                key,
            };
            edges.push(Edge {
                child: child.identity(),
                parent: parent_identity.clone(),
            });
            entities.push(child);
        }

        Ok(RowContribution {
            file_tag: row.file_tag.clone(),
            ordinal: row.ordinal,
            entities,
            edges,
        })
    }

    fn column_for_parent_field(&self, field: &str) -> String {
        self.plan
            .iter()
            .find(|bound| bound.role == Role::ParentField && bound.field == field)
            .map(|bound| bound.column.clone())
            .unwrap_or_else(|| field.to_string())
    }
}

/// Coerce a decoded cell into a typed field value.
///
/// Returns the offending raw value on failure.
fn coerce(cell: &CellValue, semantic: SemanticType) -> std::result::Result<FieldValue, String> {
    match (cell, semantic) {
        (CellValue::Null, _) => Ok(FieldValue::Null),

        (CellValue::Text(s), SemanticType::String) => Ok(FieldValue::Text(s.clone())),
        (CellValue::Text(s), SemanticType::EnumCode) => Ok(FieldValue::Code(s.clone())),
        (CellValue::Text(s), SemanticType::Date) => match parse_datetime(s) {
            Some(ts) => Ok(timestamp_value(ts)),
            None => Err(s.clone()),
        },
        (CellValue::Text(s), SemanticType::Boolean) => {
            match s.to_ascii_uppercase().as_str() {
                "Y" | "YES" | "T" | "TRUE" | "1" => Ok(FieldValue::Bool(true)),
                "N" | "NO" | "F" | "FALSE" | "0" => Ok(FieldValue::Bool(false)),
                _ => Err(s.clone()),
            }
        },
        (CellValue::Text(s), SemanticType::NumericId) => {
            s.trim().parse::<i64>().map(FieldValue::Id).map_err(|_| s.clone())
        },

        (CellValue::Timestamp(ts), SemanticType::Date) => Ok(timestamp_value(*ts)),
        (CellValue::Timestamp(ts), SemanticType::String) => {
            Ok(FieldValue::Text(ts.format("%Y-%m-%d %H:%M:%S").to_string()))
        },
        (CellValue::Timestamp(ts), _) => Err(ts.to_string()),
    }
}

/// Midnight timestamps collapse to a date so `2020-01-01 00:00:00` and
/// `2020-01-01` merge as the same observation.
fn timestamp_value(ts: chrono::NaiveDateTime) -> FieldValue {
    if ts.time() == chrono::NaiveTime::MIN {
        FieldValue::Date(ts.date())
    } else {
        FieldValue::DateTime(ts)
    }
}
