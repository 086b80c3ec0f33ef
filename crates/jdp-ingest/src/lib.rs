//! JDP ingest engine
//!
//! Transforms per-region raw administrative extracts (flat delimited files
//! with heterogeneous encodings, separators, and quoting conventions) into a
//! normalized, deduplicated entity graph.
//!
//! # Architecture
//!
//! - **manifest**: region manifest (per-file encoding, separator, quoting,
//!   primary key and datetime columns) with fail-fast validation
//! - **mapping**: per-file column → entity-field mapping specifications
//! - **schema**: catalog of entity types, semantic field types, and abstract
//!   ancestor families
//! - **bindings**: resolves a file's header against its mapping; fails closed
//!   on any unmapped column
//! - **normalize**: decodes and splits raw rows, parses datetime columns,
//!   rejects rows with incomplete primary keys
//! - **graph**: builds each row's entities and child→parent edges
//! - **store**: concurrent merge store; last-non-null-wins, conflicts
//!   surfaced, never guessed away
//! - **pipeline**: per-region orchestration and fan-out over file tags
//! - **report**: structured run report for downstream consumers
//! - **source**: the upstream raw-byte supplier boundary
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use jdp_ingest::{
//!     EntityCatalog, IngestPipeline, IngestSettings, LocalFileSource, ManifestRegistry,
//!     MappingSpec,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = ManifestRegistry::load("config/us_xx/manifest.yaml")?;
//!     let catalog = EntityCatalog::load("config/entities.yaml")?;
//!     let mappings = vec![MappingSpec::load("config/us_xx/sprvsn_cntc.yaml")?];
//!
//!     let pipeline =
//!         IngestPipeline::new(registry, catalog, mappings, IngestSettings::from_env()?)?;
//!     let source = Arc::new(LocalFileSource::new("data/us_xx"));
//!
//!     let outcome = pipeline.run(source).await?;
//!     println!("{}", outcome.report.summary());
//!     Ok(())
//! }
//! ```

pub mod bindings;
pub mod config;
pub mod entity;
pub mod error;
pub mod graph;
pub mod manifest;
pub mod mapping;
pub mod normalize;
pub mod pipeline;
pub mod report;
pub mod schema;
pub mod source;
pub mod store;

// Re-export commonly used types
pub use bindings::{BindingSet, ColumnBinding};
pub use config::IngestSettings;
pub use entity::{Entity, EntityKey, EntityState, FieldValue};
pub use error::{IngestError, Result, RowError};
pub use graph::{Edge, EntityGraphBuilder, RowContribution};
pub use manifest::{FileConfig, ManifestRegistry, RegionManifest};
pub use mapping::{FieldRef, MappingSpec};
pub use normalize::{CellValue, NormalizedRow, RowStream};
pub use pipeline::IngestPipeline;
pub use report::{FileReport, IngestOutcome, IngestReport, RowSkip};
pub use schema::{EntityCatalog, EntitySchema, SemanticType};
pub use source::{InMemorySource, LocalFileSource, RawFileSource};
pub use store::{ApplyStats, EntityStore, MergeConflict, MergeOutcome};
