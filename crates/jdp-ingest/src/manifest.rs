//! Region manifest handling
//!
//! One manifest per region describes the structure of every raw file the
//! region delivers: encoding, separator, quoting policy, primary key columns,
//! datetime columns. File entries inherit `default_encoding` and
//! `default_separator` unless they override them.
//!
//! # Format
//! ```yaml
//! region_code: us_xx
//! default_encoding: utf-8
//! default_separator: "|"
//! raw_files:
//!   - file_tag: sprvsn_cntc
//!     primary_key_cols: [ofndr_num, cntc_dt]
//!     datetime_cols: [cntc_dt]
//!   - file_tag: ofndr
//!     primary_key_cols: [ofndr_num]
//!     encoding: latin-1
//!     separator: ","
//!     ignore_quotes: true
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use encoding_rs::Encoding;
use jdp_common::types::RegionCode;
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

/// Raw manifest file entry as written in YAML, before defaults are applied
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawFileEntry {
    /// Logical identifier for this file type within the region
    pub file_tag: String,
    /// Columns whose combined value identifies a record across dumps
    pub primary_key_cols: Vec<String>,
    /// Encoding override (defaults to the region's `default_encoding`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    /// Separator override (defaults to the region's `default_separator`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,
    /// Treat quote characters as literal data rather than field delimiters
    #[serde(default)]
    pub ignore_quotes: bool,
    /// Columns parsed as datetimes during normalization
    #[serde(default)]
    pub datetime_cols: BTreeSet<String>,
}

/// Region manifest as written in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionManifest {
    pub region_code: String,
    pub default_encoding: String,
    pub default_separator: String,
    pub raw_files: Vec<RawFileEntry>,
}

/// Fully resolved configuration for one raw file, defaults applied and
/// encoding label verified
#[derive(Debug, Clone)]
pub struct FileConfig {
    pub file_tag: String,
    /// Resolved encoding, ready to decode with
    pub encoding: &'static Encoding,
    /// The label the manifest used, kept for error messages
    pub encoding_label: String,
    /// Field separator, a single byte
    pub separator: u8,
    pub ignore_quotes: bool,
    pub primary_key_cols: Vec<String>,
    pub datetime_cols: BTreeSet<String>,
}

/// Validated, immutable registry of per-file configurations for one region.
///
/// Built once from a [`RegionManifest`]; lookups afterwards are pure and
/// cannot fail except for unknown tags.
#[derive(Debug, Clone)]
pub struct ManifestRegistry {
    region: RegionCode,
    files: HashMap<String, FileConfig>,
}

impl ManifestRegistry {
    /// Load and validate a manifest from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate a manifest from a YAML string
    ///
    /// Fails fast: a manifest with a duplicate file tag, an empty or
    /// duplicated primary key list, an unknown encoding label, or a
    /// multi-byte separator does not load at all.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let manifest: RegionManifest = serde_yaml::from_str(yaml)?;
        Self::from_manifest(manifest)
    }

    /// Validate an already-deserialized manifest
    pub fn from_manifest(manifest: RegionManifest) -> Result<Self> {
        let region = RegionCode::new(&manifest.region_code);

        if manifest.region_code.trim().is_empty() {
            return Err(IngestError::config(
                &manifest.region_code,
                "region_code must not be empty",
            ));
        }
        if manifest.raw_files.is_empty() {
            return Err(IngestError::config(
                region.as_str(),
                "manifest declares no raw_files",
            ));
        }

        let default_separator =
            parse_separator(region.as_str(), "default_separator", &manifest.default_separator)?;
        let default_encoding =
            parse_encoding(region.as_str(), "default_encoding", &manifest.default_encoding)?;

        let mut files = HashMap::with_capacity(manifest.raw_files.len());
        for entry in &manifest.raw_files {
            if entry.file_tag.trim().is_empty() {
                return Err(IngestError::config(
                    region.as_str(),
                    "raw_files entry with empty file_tag",
                ));
            }
            if entry.primary_key_cols.is_empty() {
                return Err(IngestError::config(
                    region.as_str(),
                    format!("file '{}' declares no primary_key_cols", entry.file_tag),
                ));
            }
            let unique: BTreeSet<&String> = entry.primary_key_cols.iter().collect();
            if unique.len() != entry.primary_key_cols.len() {
                return Err(IngestError::config(
                    region.as_str(),
                    format!(
                        "file '{}' repeats a column in primary_key_cols",
                        entry.file_tag
                    ),
                ));
            }

            let (encoding, encoding_label) = match &entry.encoding {
                Some(label) => (
                    parse_encoding(region.as_str(), &entry.file_tag, label)?,
                    label.clone(),
                ),
                None => (default_encoding, manifest.default_encoding.clone()),
            };
            let separator = match &entry.separator {
                Some(sep) => parse_separator(region.as_str(), &entry.file_tag, sep)?,
                None => default_separator,
            };

            let config = FileConfig {
                file_tag: entry.file_tag.clone(),
                encoding,
                encoding_label,
                separator,
                ignore_quotes: entry.ignore_quotes,
                primary_key_cols: entry.primary_key_cols.clone(),
                datetime_cols: entry.datetime_cols.clone(),
            };

            if files.insert(entry.file_tag.clone(), config).is_some() {
                return Err(IngestError::config(
                    region.as_str(),
                    format!("duplicate file_tag '{}'", entry.file_tag),
                ));
            }
        }

        Ok(Self { region, files })
    }

    /// The region this manifest belongs to
    pub fn region(&self) -> &RegionCode {
        &self.region
    }

    /// Resolve the effective configuration for a file tag
    pub fn resolve_file_config(&self, file_tag: &str) -> Result<&FileConfig> {
        self.files
            .get(file_tag)
            .ok_or_else(|| IngestError::UnknownFileTag {
                file_tag: file_tag.to_string(),
            })
    }

    /// All declared file tags, sorted for deterministic iteration
    pub fn file_tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.files.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn parse_encoding(region: &str, context: &str, label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| {
        IngestError::config(
            region,
            format!("'{}': unknown encoding label '{}'", context, label),
        )
    })
}

fn parse_separator(region: &str, context: &str, separator: &str) -> Result<u8> {
    let bytes = separator.as_bytes();
    if bytes.len() != 1 {
        return Err(IngestError::config(
            region,
            format!(
                "'{}': separator must be a single byte, got '{}'",
                context, separator
            ),
        ));
    }
    Ok(bytes[0])
}
