//! Raw file supply
//!
//! The upstream collaborator boundary: something hands the engine each file
//! tag's raw bytes in file order. Download, decompression, and credential
//! concerns live behind this trait, outside the engine.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;

/// Supplies the raw bytes for a file tag
#[async_trait]
pub trait RawFileSource: Send + Sync {
    /// Fetch the raw contents of one file tag
    async fn fetch(&self, file_tag: &str) -> Result<Vec<u8>>;
}

/// Reads `{root}/{file_tag}.{extension}` from local disk
pub struct LocalFileSource {
    root: PathBuf,
    extension: String,
}

impl LocalFileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: "csv".to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }
}

#[async_trait]
impl RawFileSource for LocalFileSource {
    async fn fetch(&self, file_tag: &str) -> Result<Vec<u8>> {
        let path = self.root.join(format!("{}.{}", file_tag, self.extension));
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Reading raw file {}", path.display()))
    }
}

/// In-memory source for tests and fixtures
#[derive(Default)]
pub struct InMemorySource {
    files: HashMap<String, Vec<u8>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, file_tag: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.files.insert(file_tag.into(), bytes.into());
        self
    }

    pub fn insert(&mut self, file_tag: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.insert(file_tag.into(), bytes.into());
    }
}

#[async_trait]
impl RawFileSource for InMemorySource {
    async fn fetch(&self, file_tag: &str) -> Result<Vec<u8>> {
        self.files
            .get(file_tag)
            .cloned()
            .with_context(|| format!("No raw file staged for tag '{}'", file_tag))
    }
}
