//! JDP Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the JDP project.
//!
//! # Overview
//!
//! This crate provides common functionality used across all JDP workspace members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Checksums**: Raw-file fingerprinting utilities
//! - **Logging**: Centralized tracing initialization
//! - **Types**: Shared domain types (region codes, run identifiers)
//!
//! # Example
//!
//! ```no_run
//! use jdp_common::{Result, JdpError};
//! use jdp_common::checksum::Checksum;
//!
//! fn fingerprint_extract(path: &str) -> Result<()> {
//!     let checksum = Checksum::from_file(path)?;
//!     tracing::info!(checksum = %checksum, "Fingerprinted raw extract");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{JdpError, Result};
