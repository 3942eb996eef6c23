//! Preflight common types, IDs, and errors.
//!
//! This crate provides foundational types shared across pf-core modules:
//! - Process identity with case-insensitive name matching
//! - Common error types with stable codes
//! - Output formats for command payloads

pub mod error;
pub mod id;
pub mod identity;
pub mod output;

pub use error::{Error, Result};
pub use id::ProcessId;
pub use identity::ProcessIdentity;
pub use output::OutputFormat;

/// Version of the JSON output envelope. Bump on breaking payload changes.
pub const SCHEMA_VERSION: &str = "1.0.0";
