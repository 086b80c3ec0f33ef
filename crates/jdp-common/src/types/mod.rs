//! Common types used across JDP

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one region (jurisdiction) whose extracts are ingested together.
///
/// Region codes follow the `xx_yy` convention (country, subdivision), e.g.
/// `us_xx`. Stored lowercase; comparison is case-insensitive at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionCode(String);

impl RegionCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RegionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for one ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_region_code_lowercases() {
        let region = RegionCode::new("US_XX");
        assert_eq!(region.as_str(), "us_xx");
        assert_eq!(region.to_string(), "us_xx");
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }
}
