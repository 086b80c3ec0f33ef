//! Entity merge/reconciliation store
//!
//! The single shared-mutation point of an ingestion run. Entities are keyed
//! by `(entity_type, primary key tuple)`; repeated observations merge
//! field-by-field under last-non-null-wins: an incoming non-null value fills
//! a hole, an incoming null never erases, and two differing non-null values
//! record a conflict instead of guessing which row is right: the stored
//! value is kept and the disagreement surfaces in the run report.
//!
//! Same-identity upserts serialize on the map's entry lock; different
//! identities proceed fully in parallel. Contributions apply entities first
//! and edges last, so cancellation mid-run never leaves an edge without its
//! endpoints.

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::entity::{Entity, EntityKey, EntityState, FieldValue};
use crate::graph::{Edge, RowContribution};
use crate::schema::EntityCatalog;

/// Result of one upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    Inserted,
    Updated,
    Unchanged,
    /// At least one field disagreed with a stored non-null value
    Conflicted,
}

/// A recorded disagreement between two observations of the same entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConflict {
    pub entity_type: String,
    pub key: Vec<String>,
    pub field: String,
    /// Value already in the store (kept)
    pub stored: FieldValue,
    /// Value the incoming row asserted (not applied)
    pub incoming: FieldValue,
    /// Origin of the incoming observation
    pub file_tag: String,
    pub row: u64,
}

/// Counts accumulated while applying contributions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyStats {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub conflicted: usize,
    pub edges_added: usize,
}

impl ApplyStats {
    pub fn entities_touched(&self) -> usize {
        self.inserted + self.updated + self.unchanged + self.conflicted
    }

    pub fn merge(&mut self, other: &ApplyStats) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.conflicted += other.conflicted;
        self.edges_added += other.edges_added;
    }
}

/// Concurrent, deduplicating entity store
pub struct EntityStore {
    catalog: Arc<EntityCatalog>,
    entities: DashMap<EntityKey, Entity>,
    edges: DashSet<Edge>,
    conflicts: Mutex<Vec<MergeConflict>>,
}

impl EntityStore {
    pub fn new(catalog: Arc<EntityCatalog>) -> Self {
        Self {
            catalog,
            entities: DashMap::new(),
            edges: DashSet::new(),
            conflicts: Mutex::new(Vec::new()),
        }
    }

    /// Apply one row's atomic contribution: entities, then edges
    pub fn apply(&self, contribution: RowContribution) -> ApplyStats {
        let mut stats = ApplyStats::default();
        let file_tag = contribution.file_tag;
        let row = contribution.ordinal;

        for entity in contribution.entities {
            match self.upsert(entity, &file_tag, row) {
                MergeOutcome::Inserted => stats.inserted += 1,
                MergeOutcome::Updated => stats.updated += 1,
                MergeOutcome::Unchanged => stats.unchanged += 1,
                MergeOutcome::Conflicted => stats.conflicted += 1,
            }
        }
        for edge in contribution.edges {
            if self.link(edge) {
                stats.edges_added += 1;
            }
        }

        stats
    }

    /// Insert or merge one entity under its identity
    pub fn upsert(&self, entity: Entity, file_tag: &str, row: u64) -> MergeOutcome {
        use dashmap::mapref::entry::Entry;

        let identity = entity.identity();
        match self.entities.entry(identity) {
            Entry::Vacant(slot) => {
                slot.insert(entity);
                MergeOutcome::Inserted
            },
            Entry::Occupied(mut slot) => {
                let stored = slot.get_mut();
                let mut changed = false;
                let mut conflicted = false;

                for (field, incoming) in entity.fields {
                    if incoming.is_null() {
                        // A null observation never erases prior knowledge.
                        continue;
                    }
                    match stored.fields.get(&field) {
                        None | Some(FieldValue::Null) => {
                            stored.fields.insert(field, incoming);
                            changed = true;
                        },
                        Some(existing) if *existing == incoming => {},
                        Some(existing) => {
                            debug!(
                                entity = %stored.identity(),
                                field = %field,
                                "Merge conflict recorded"
                            );
                            self.conflicts.lock().push(MergeConflict {
                                entity_type: stored.entity_type.clone(),
                                key: stored.key.clone(),
                                field,
                                stored: existing.clone(),
                                incoming,
                                file_tag: file_tag.to_string(),
                                row,
                            });
                            conflicted = true;
                        },
                    }
                }

                if conflicted {
                    MergeOutcome::Conflicted
                } else if changed {
                    MergeOutcome::Updated
                } else {
                    MergeOutcome::Unchanged
                }
            },
        }
    }

    /// Record a child→parent link; re-adding is a no-op.
    /// Returns true when the edge was new.
    pub fn link(&self, edge: Edge) -> bool {
        self.edges.insert(edge)
    }

    /// Number of distinct entity identities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Lifecycle state of one entity, if present
    pub fn entity_state(&self, key: &EntityKey) -> Option<EntityState> {
        let entity = self.entities.get(key)?;
        let schema = self.catalog.get(&entity.entity_type)?;
        Some(entity.state(schema))
    }

    /// Snapshot of one entity
    pub fn get(&self, key: &EntityKey) -> Option<Entity> {
        self.entities.get(key).map(|entry| entry.value().clone())
    }

    /// Deterministic snapshot of all entities, sorted by identity
    pub fn entities(&self) -> Vec<Entity> {
        let mut all: Vec<Entity> = self
            .entities
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| {
            (&a.entity_type, &a.key).cmp(&(&b.entity_type, &b.key))
        });
        all
    }

    /// Deterministic snapshot of all edges
    pub fn edges(&self) -> Vec<Edge> {
        let mut all: Vec<Edge> = self.edges.iter().map(|entry| entry.key().clone()).collect();
        all.sort_by(|a, b| {
            (&a.child.entity_type, &a.child.key, &a.parent.key)
                .cmp(&(&b.child.entity_type, &b.child.key, &b.parent.key))
        });
        all
    }

    /// All conflicts recorded so far, in arrival order
    pub fn conflicts(&self) -> Vec<MergeConflict> {
        self.conflicts.lock().clone()
    }
}
