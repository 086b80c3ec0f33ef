//! Error types for the ingest engine
//!
//! Two severities exist and they never mix: `IngestError` aborts a region or
//! a single file before/while it streams, `RowError` skips one row and is
//! recorded in the run report.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors that abort a region load or a single file's ingest.
///
/// Configuration-level variants abort the whole region before any row is
/// processed. `UnmappedColumn` and `UnresolvedAncestorType` are fatal for one
/// file tag: they mean the mapping specification is stale relative to the raw
/// file, which is cheap to fix and must not be papered over.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Configuration error in {scope}: {message}")]
    Configuration { scope: String, message: String },

    #[error("Unknown file tag '{file_tag}': not declared in the region manifest")]
    UnknownFileTag { file_tag: String },

    #[error(
        "Column '{column}' in file '{file_tag}' is neither mapped nor ignored. \
         Add it to key_mappings, child_key_mappings, or keys_to_ignore."
    )]
    UnmappedColumn { file_tag: String, column: String },

    #[error(
        "File '{file_tag}' builds child entities of type '{child_type}' whose ancestor \
         '{abstract_type}' is abstract, but enforced_ancestor_types declares no concrete \
         subtype for it"
    )]
    UnresolvedAncestorType {
        file_tag: String,
        child_type: String,
        abstract_type: String,
    },

    #[error("Primary key column '{column}' of file '{file_tag}' is missing from the file header")]
    MissingKeyColumn { file_tag: String, column: String },

    #[error("Failed to decode file '{file_tag}' with encoding '{encoding}'")]
    Decode { file_tag: String, encoding: String },

    #[error("File '{file_tag}' is empty: no header row")]
    EmptyFile { file_tag: String },

    #[error("Failed to fetch raw file '{file_tag}': {message}")]
    Fetch { file_tag: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl IngestError {
    /// Shorthand for configuration failures, the most constructed variant
    pub fn config(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            scope: scope.into(),
            message: message.into(),
        }
    }
}

/// Errors that skip a single row.
///
/// The row is excluded from the output stream and recorded in the run report;
/// the file's ingest continues.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowError {
    #[error("row {row} of '{file_tag}': primary key column '{column}' is empty")]
    MissingPrimaryKey {
        file_tag: String,
        row: u64,
        column: String,
    },

    #[error(
        "row {row} of '{file_tag}': value '{value}' in column '{column}' matches none of the \
         accepted datetime formats"
    )]
    DateParse {
        file_tag: String,
        row: u64,
        column: String,
        value: String,
    },

    #[error("row {row} of '{file_tag}': expected {expected} fields, got {actual}")]
    FieldCount {
        file_tag: String,
        row: u64,
        expected: usize,
        actual: usize,
    },

    #[error(
        "row {row} of '{file_tag}': cannot read '{value}' in column '{column}' as {semantic}"
    )]
    Coerce {
        file_tag: String,
        row: u64,
        column: String,
        value: String,
        semantic: String,
    },

    #[error("row {row} of '{file_tag}': malformed record: {message}")]
    Malformed {
        file_tag: String,
        row: u64,
        message: String,
    },
}

impl RowError {
    /// The 1-based ordinal of the offending row
    pub fn row(&self) -> u64 {
        match self {
            RowError::MissingPrimaryKey { row, .. }
            | RowError::DateParse { row, .. }
            | RowError::FieldCount { row, .. }
            | RowError::Coerce { row, .. }
            | RowError::Malformed { row, .. } => *row,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmapped_column_names_column_and_file() {
        let err = IngestError::UnmappedColumn {
            file_tag: "sprvsn_cntc".to_string(),
            column: "lan_id".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("lan_id"));
        assert!(message.contains("sprvsn_cntc"));
    }

    #[test]
    fn test_row_error_reports_ordinal() {
        let err = RowError::MissingPrimaryKey {
            file_tag: "sprvsn_cntc".to_string(),
            row: 42,
            column: "ofndr_num".to_string(),
        };
        assert_eq!(err.row(), 42);
        assert!(err.to_string().contains("ofndr_num"));
    }

    #[test]
    fn test_row_error_round_trips_through_json() {
        let err = RowError::DateParse {
            file_tag: "ofndr".to_string(),
            row: 7,
            column: "birth_dt".to_string(),
            value: "not-a-date".to_string(),
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: RowError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
