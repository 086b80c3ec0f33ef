//! Structured run reporting
//!
//! The downstream-facing record of what an ingestion run did: per-file row
//! accounting, itemized skipped rows, merge conflicts, and raw-file
//! fingerprints. Conflicts are never dropped; a run with conflicts is not
//! clean, whatever else succeeded.

use chrono::{DateTime, Utc};
use jdp_common::types::{RegionCode, RunId};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::RowError;
use crate::graph::Edge;
use crate::store::MergeConflict;

/// One skipped row, kept for manual review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowSkip {
    pub ordinal: u64,
    pub error: RowError,
}

/// Per-file accounting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub file_tag: String,
    /// Fingerprint of the raw bytes, `algo:digest`; absent when the fetch failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    pub rows_read: u64,
    pub rows_skipped: u64,
    /// Rows whose every column was ignored (legal, but worth noticing)
    pub rows_empty: u64,
    pub entities_touched: usize,
    pub edges_added: usize,
    /// Itemized skips, capped by `IngestSettings::max_recorded_skips`
    pub skips: Vec<RowSkip>,
    /// Fatal error that stopped this file, when one occurred
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileReport {
    pub fn failed(file_tag: impl Into<String>, error: impl ToString) -> Self {
        Self {
            file_tag: file_tag.into(),
            checksum: None,
            rows_read: 0,
            rows_skipped: 0,
            rows_empty: 0,
            entities_touched: 0,
            edges_added: 0,
            skips: Vec::new(),
            error: Some(error.to_string()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Full report for one ingestion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub run_id: RunId,
    pub region: RegionCode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One entry per file tag, sorted by tag
    pub files: Vec<FileReport>,
    pub conflicts: Vec<MergeConflict>,
}

impl IngestReport {
    /// True when every file completed, no rows were skipped, and no merge
    /// conflicts were recorded
    pub fn is_clean(&self) -> bool {
        !self.has_conflicts()
            && self
                .files
                .iter()
                .all(|f| !f.is_failed() && f.rows_skipped == 0)
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn rows_read(&self) -> u64 {
        self.files.iter().map(|f| f.rows_read).sum()
    }

    pub fn rows_skipped(&self) -> u64 {
        self.files.iter().map(|f| f.rows_skipped).sum()
    }

    pub fn failed_files(&self) -> Vec<&FileReport> {
        self.files.iter().filter(|f| f.is_failed()).collect()
    }

    /// One-line human summary
    pub fn summary(&self) -> String {
        format!(
            "region {}: {} files ({} failed), {} rows read, {} skipped, {} conflicts",
            self.region,
            self.files.len(),
            self.failed_files().len(),
            self.rows_read(),
            self.rows_skipped(),
            self.conflicts.len(),
        )
    }

    /// Serialize the report for downstream consumers
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// What a run hands downstream: the report plus the final graph snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub report: IngestReport,
    pub entities: Vec<Entity>,
    pub edges: Vec<Edge>,
}
