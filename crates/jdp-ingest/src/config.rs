//! Ingest engine runtime settings
//!
//! Settings that tune how a run executes, not what it ingests (the manifest,
//! mapping specs, and entity catalog own that). Loaded from `INGEST_*`
//! environment variables.

use serde::{Deserialize, Serialize};

/// Runtime settings for an ingestion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSettings {
    /// Number of file tags ingested concurrently
    pub worker_threads: usize,
    /// Cap on skipped-row records retained per file in the run report.
    /// Rows beyond the cap are still counted, just not itemized.
    pub max_recorded_skips: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            max_recorded_skips: 1000,
        }
    }
}

impl IngestSettings {
    /// Load settings from environment variables
    ///
    /// - `INGEST_WORKER_THREADS`: concurrent file tags (default: 4)
    /// - `INGEST_MAX_RECORDED_SKIPS`: itemized skip records per file (default: 1000)
    pub fn from_env() -> anyhow::Result<Self> {
        let settings = Self {
            worker_threads: std::env::var("INGEST_WORKER_THREADS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .unwrap_or(4),
            max_recorded_skips: std::env::var("INGEST_MAX_RECORDED_SKIPS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_threads == 0 {
            anyhow::bail!("INGEST_WORKER_THREADS must be greater than 0");
        }
        Ok(())
    }
}
