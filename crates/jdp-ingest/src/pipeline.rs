//! Region ingestion pipeline
//!
//! Wires the components together for one region: manifest registry, entity
//! catalog, and mapping specs load and cross-validate once (fail fast:
//! configuration problems are cheap to fix before any row is touched), then
//! each file tag streams rows through normalize → build → merge. Independent
//! file tags fan out across workers; the merge store is the single shared
//! structure.
//!
//! Steps per file:
//! 1. Fetch raw bytes from the source
//! 2. Fingerprint them for the run report
//! 3. Decode and read the header
//! 4. Resolve column bindings (fails closed on unmapped columns)
//! 5. Stream rows: normalize, build entities, merge into the store

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use jdp_common::checksum::Checksum;
use jdp_common::types::{RegionCode, RunId};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::bindings::BindingSet;
use crate::config::IngestSettings;
use crate::error::{IngestError, Result};
use crate::graph::EntityGraphBuilder;
use crate::manifest::ManifestRegistry;
use crate::mapping::MappingSpec;
use crate::normalize::RowStream;
use crate::report::{FileReport, IngestOutcome, IngestReport, RowSkip};
use crate::schema::EntityCatalog;
use crate::source::RawFileSource;
use crate::store::{ApplyStats, EntityStore};

/// Orchestrates ingestion runs for one region
#[derive(Debug)]
pub struct IngestPipeline {
    registry: Arc<ManifestRegistry>,
    catalog: Arc<EntityCatalog>,
    mappings: Arc<HashMap<String, MappingSpec>>,
    settings: IngestSettings,
}

impl IngestPipeline {
    /// Assemble a pipeline, validating all configuration up front.
    ///
    /// Every file tag in the manifest must have a mapping spec, every
    /// mapping spec must name a manifest tag, and every mapping must be
    /// consistent with the entity catalog. Any violation fails the region.
    pub fn new(
        registry: ManifestRegistry,
        catalog: EntityCatalog,
        mappings: Vec<MappingSpec>,
        settings: IngestSettings,
    ) -> Result<Self> {
        let region = registry.region().clone();
        settings
            .validate()
            .map_err(|e| IngestError::config(region.as_str(), e.to_string()))?;

        let mut by_tag = HashMap::with_capacity(mappings.len());
        for mapping in mappings {
            mapping.validate(&catalog)?;
            if registry.resolve_file_config(&mapping.file_tag).is_err() {
                return Err(IngestError::config(
                    region.as_str(),
                    format!(
                        "mapping spec '{}' has no manifest entry",
                        mapping.file_tag
                    ),
                ));
            }
            if by_tag.insert(mapping.file_tag.clone(), mapping).is_some() {
                return Err(IngestError::config(
                    region.as_str(),
                    "duplicate mapping spec".to_string(),
                ));
            }
        }
        for file_tag in registry.file_tags() {
            if !by_tag.contains_key(file_tag) {
                return Err(IngestError::config(
                    region.as_str(),
                    format!("file '{}' has no mapping spec", file_tag),
                ));
            }
        }

        Ok(Self {
            registry: Arc::new(registry),
            catalog: Arc::new(catalog),
            mappings: Arc::new(by_tag),
            settings,
        })
    }

    /// The region this pipeline ingests
    pub fn region(&self) -> &RegionCode {
        self.registry.region()
    }

    /// Run a full ingestion over every declared file tag into a fresh store
    pub async fn run(&self, source: Arc<dyn RawFileSource>) -> Result<IngestOutcome> {
        let store = Arc::new(EntityStore::new(self.catalog.clone()));
        self.run_with_store(source, store).await
    }

    /// Run a full ingestion into an existing store.
    ///
    /// Reusing a store across runs reconciles new dumps against entities
    /// from earlier runs; the returned report covers only this run's rows
    /// and conflicts, while the outcome snapshot covers the whole store.
    pub async fn run_with_store(
        &self,
        source: Arc<dyn RawFileSource>,
        store: Arc<EntityStore>,
    ) -> Result<IngestOutcome> {
        let run_id = RunId::new();
        let started_at = Utc::now();
        let conflict_mark = store.conflicts().len();

        let tags: Vec<String> = self
            .registry
            .file_tags()
            .into_iter()
            .map(String::from)
            .collect();
        info!(
            run_id = %run_id,
            region = %self.region(),
            files = tags.len(),
            workers = self.settings.worker_threads,
            "Starting ingestion run"
        );

        let semaphore = Arc::new(Semaphore::new(self.settings.worker_threads));
        let mut join_set = JoinSet::new();
        for file_tag in tags {
            let registry = self.registry.clone();
            let catalog = self.catalog.clone();
            let mappings = self.mappings.clone();
            let settings = self.settings.clone();
            let source = source.clone();
            let store = store.clone();
            let semaphore = semaphore.clone();

            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return FileReport::failed(file_tag, "worker pool shut down"),
                };
                ingest_file(
                    &registry, &catalog, &mappings, &settings, &*source, &store, &file_tag,
                )
                .await
            });
        }

        let mut files = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(report) => files.push(report),
                Err(e) => {
                    error!(error = %e, "File ingest task aborted");
                    files.push(FileReport::failed("<aborted>", e));
                },
            }
        }
        files.sort_by(|a, b| a.file_tag.cmp(&b.file_tag));

        let conflicts = store.conflicts().split_off(conflict_mark);
        let report = IngestReport {
            run_id,
            region: self.region().clone(),
            started_at,
            finished_at: Utc::now(),
            files,
            conflicts,
        };

        info!(
            run_id = %run_id,
            entities = store.len(),
            "{}",
            report.summary()
        );

        Ok(IngestOutcome {
            report,
            entities: store.entities(),
            edges: store.edges(),
        })
    }
}

/// Ingest one file tag; fatal per-file errors become a failed report so the
/// rest of the run continues
async fn ingest_file(
    registry: &ManifestRegistry,
    catalog: &EntityCatalog,
    mappings: &HashMap<String, MappingSpec>,
    settings: &IngestSettings,
    source: &dyn RawFileSource,
    store: &EntityStore,
    file_tag: &str,
) -> FileReport {
    match try_ingest_file(registry, catalog, mappings, settings, source, store, file_tag).await {
        Ok(report) => report,
        Err(e) => {
            error!(file_tag = %file_tag, error = %e, "File ingest failed");
            FileReport::failed(file_tag, e)
        },
    }
}

async fn try_ingest_file(
    registry: &ManifestRegistry,
    catalog: &EntityCatalog,
    mappings: &HashMap<String, MappingSpec>,
    settings: &IngestSettings,
    source: &dyn RawFileSource,
    store: &EntityStore,
    file_tag: &str,
) -> Result<FileReport> {
    let config = registry.resolve_file_config(file_tag)?;
    let mapping = mappings
        .get(file_tag)
        .ok_or_else(|| IngestError::UnknownFileTag {
            file_tag: file_tag.to_string(),
        })?;

    info!(file_tag = %file_tag, "Fetching raw file");
    let bytes = source
        .fetch(file_tag)
        .await
        .map_err(|e| IngestError::Fetch {
            file_tag: file_tag.to_string(),
            message: format!("{e:#}"),
        })?;
    let checksum = Checksum::of_bytes(&bytes);

    let mut stream = RowStream::open(config, &bytes)?;
    let bindings = BindingSet::resolve(config, mapping, catalog, stream.header())?;
    let builder = EntityGraphBuilder::new(&bindings, catalog)?;
    info!(
        file_tag = %file_tag,
        columns = bindings.len(),
        checksum = %checksum,
        "Resolved column bindings, streaming rows"
    );

    let mut rows_read = 0u64;
    let mut rows_skipped = 0u64;
    let mut rows_empty = 0u64;
    let mut skips: Vec<RowSkip> = Vec::new();
    let mut stats = ApplyStats::default();

    for row in stream.by_ref() {
        rows_read += 1;
        let contribution = match row.and_then(|row| builder.build(&row)) {
            Ok(contribution) => contribution,
            Err(skip) => {
                warn!(file_tag = %file_tag, error = %skip, "Skipped row");
                rows_skipped += 1;
                if skips.len() < settings.max_recorded_skips {
                    skips.push(RowSkip {
                        ordinal: skip.row(),
                        error: skip,
                    });
                }
                continue;
            },
        };
        if contribution.is_empty() {
            warn!(file_tag = %file_tag, row = contribution.ordinal, "Row touched no entity");
            rows_empty += 1;
            continue;
        }
        stats.merge(&store.apply(contribution));
    }

    info!(
        file_tag = %file_tag,
        rows_read,
        rows_skipped,
        entities = stats.entities_touched(),
        conflicts = stats.conflicted,
        "File ingest completed"
    );

    Ok(FileReport {
        file_tag: file_tag.to_string(),
        checksum: Some(checksum.to_string()),
        rows_read,
        rows_skipped,
        rows_empty,
        entities_touched: stats.entities_touched(),
        edges_added: stats.edges_added,
        skips,
        error: None,
    })
}
