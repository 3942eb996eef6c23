//! Error types for Preflight.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for automation
//! - Remediation suggestions for humans
//!
//! # Human-Facing Output
//!
//! Errors can be formatted for human consumption with headline, reason, and fix:
//! ```text
//! ✗ Access Denied
//!   Reason: access denied while duplicating handle owned by process 4312
//!   Fix: Re-run from an elevated session, or scan with --continue-on-denied.
//! ```
//!
//! # Machine-Facing Output
//!
//! Errors serialize to structured JSON:
//! ```json
//! {
//!   "code": 22,
//!   "category": "scan",
//!   "message": "access denied while opening process 4312",
//!   "recoverable": true
//! }
//! ```
//!
//! Two conditions are deliberately NOT errors anywhere in this workspace: a
//! countdown expiring (that is the `Timeout` outcome of the close-apps state
//! machine) and an ancestry walk stopping early (partial chains are the
//! documented best-effort contract).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for Preflight operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Invalid options or config files (scan options, countdown, config.json).
    Config,
    /// Handle-table and process scanning errors.
    Scan,
    /// Background worker (tracker/orchestrator) lifecycle errors.
    Worker,
    /// File I/O and serialization errors.
    Io,
    /// Platform compatibility errors.
    Platform,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Scan => write!(f, "scan"),
            ErrorCategory::Worker => write!(f, "worker"),
            ErrorCategory::Io => write!(f, "io"),
            ErrorCategory::Platform => write!(f, "platform"),
        }
    }
}

/// Unified error type for Preflight.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid scan options: {0}")]
    InvalidScanOptions(String),

    #[error("invalid countdown configuration: {0}")]
    InvalidCountdown(String),

    // Scan errors (20-29)
    #[error("process enumeration failed: {0}")]
    Enumeration(String),

    #[error("handle table query failed: {0}")]
    HandleTable(String),

    #[error("access denied while {context}")]
    AccessDenied { context: String },

    #[error("process {pid} not found")]
    ProcessNotFound { pid: u32 },

    // Worker errors (30-39)
    #[error("background worker failed to start: {0}")]
    WorkerSpawn(String),

    #[error("operation cancelled")]
    Cancelled,

    // I/O errors (40-49)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Platform errors (50-59)
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Scan errors
    /// - 30-39: Worker errors
    /// - 40-49: I/O errors
    /// - 50-59: Platform errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidScanOptions(_) => 11,
            Error::InvalidCountdown(_) => 12,
            Error::Enumeration(_) => 20,
            Error::HandleTable(_) => 21,
            Error::AccessDenied { .. } => 22,
            Error::ProcessNotFound { .. } => 23,
            Error::WorkerSpawn(_) => 30,
            Error::Cancelled => 31,
            Error::Io(_) => 40,
            Error::Json(_) => 41,
            Error::UnsupportedPlatform(_) => 50,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidScanOptions(_) | Error::InvalidCountdown(_) => {
                ErrorCategory::Config
            }

            Error::Enumeration(_)
            | Error::HandleTable(_)
            | Error::AccessDenied { .. }
            | Error::ProcessNotFound { .. } => ErrorCategory::Scan,

            Error::WorkerSpawn(_) | Error::Cancelled => ErrorCategory::Worker,

            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,

            Error::UnsupportedPlatform(_) => ErrorCategory::Platform,
        }
    }

    /// Returns whether this error is potentially recoverable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Config errors: recoverable by fixing the options/file
            Error::Config(_) => true,
            Error::InvalidScanOptions(_) => true,
            Error::InvalidCountdown(_) => true,

            // Scan: mostly recoverable (elevate, retry)
            Error::Enumeration(_) => true,
            Error::HandleTable(_) => true,
            Error::AccessDenied { .. } => true, // Can elevate
            Error::ProcessNotFound { .. } => false, // Process is gone

            Error::WorkerSpawn(_) => true,
            Error::Cancelled => false, // Caller asked for it

            // I/O: often transient
            Error::Io(_) => true,
            Error::Json(_) => true,

            // Platform: not recoverable at runtime
            Error::UnsupportedPlatform(_) => false,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => {
                "Check the config file syntax, or delete it to fall back to built-in defaults."
            }
            Error::InvalidScanOptions(_) => {
                "max-depth must be -1 (unbounded) or >= 0, and is only consulted with --recursive."
            }
            Error::InvalidCountdown(_) => {
                "The countdown must be a positive number of seconds when a countdown is requested."
            }

            Error::Enumeration(_) => {
                "Retry the operation. If persistent, check that the process list is readable."
            }
            Error::HandleTable(_) => {
                "Retry the scan. Handle-table snapshots can fail transiently under memory pressure."
            }
            Error::AccessDenied { .. } => {
                "Re-run from an elevated session, or allow skipping with continue-on-access-denied."
            }
            Error::ProcessNotFound { .. } => {
                "The process exited before the query completed. Normal for short-lived processes."
            }

            Error::WorkerSpawn(_) => {
                "Thread creation failed. Check system resource limits and retry."
            }
            Error::Cancelled => "The operation was cancelled by its caller. Nothing to fix.",

            Error::Io(_) => {
                "Check disk space, permissions, and that config directories exist. Retry."
            }
            Error::Json(_) => "Invalid JSON. Check the file syntax or restore from backup.",

            Error::UnsupportedPlatform(_) => {
                "Live process/handle probing requires Windows. Other hosts can only run mock-backed flows."
            }
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::InvalidScanOptions(_) => "Invalid Scan Options",
            Error::InvalidCountdown(_) => "Invalid Countdown",

            Error::Enumeration(_) => "Process Enumeration Error",
            Error::HandleTable(_) => "Handle Table Error",
            Error::AccessDenied { .. } => "Access Denied",
            Error::ProcessNotFound { .. } => "Process Not Found",

            Error::WorkerSpawn(_) => "Worker Start Failed",
            Error::Cancelled => "Cancelled",

            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",

            Error::UnsupportedPlatform(_) => "Unsupported Platform",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Additional structured context (e.g. pid, denied operation).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::ProcessNotFound { pid } => {
                context.insert("pid".to_string(), serde_json::json!(pid));
            }
            Error::AccessDenied { context: what } => {
                context.insert("denied_while".to_string(), serde_json::json!(what));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            context,
        }
    }
}

impl StructuredError {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

/// Format an error for human-readable stderr output.
///
/// Output format:
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        red = red,
        cyan = cyan,
        reset = reset,
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}
