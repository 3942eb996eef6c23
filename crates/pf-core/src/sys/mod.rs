//! OS probe layer.
//!
//! Everything in this workspace that touches live OS state goes through the
//! [`SystemProbe`] trait: process enumeration, per-process detail queries,
//! parent-pid lookup, the system handle table, the volume map, and process
//! termination. The scanner, tracker and orchestrator above this layer are
//! pure logic over the probe's answers, which keeps them testable on any host
//! and keeps all unsafe/FFI confined to the Windows implementation.
//!
//! The live implementation ([`windows::WindowsProbe`]) exists only on
//! Windows; other platforms can construct the scripted mock
//! (`mock_probe::MockProbe`, behind the `test-utils` feature) but get
//! [`Error::UnsupportedPlatform`] from [`live_probe`].

use chrono::{DateTime, Utc};
use pf_common::{Error, ProcessId, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

#[cfg(windows)]
pub mod windows;

/// One process as seen in a whole-system enumeration pass.
///
/// `name` is the executable base name with the extension stripped
/// (`notepad`, not `notepad.exe`), matching the convention close-lists are
/// written in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub pid: ProcessId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exe_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
}

/// Best-effort per-process detail. Every field is optional; callers decide
/// which absences get sentinel values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exe_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_window_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owning_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_line: Option<String>,
    /// FileDescription from the executable's version resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_description: Option<String>,
    /// ProductName from the executable's version resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    /// CompanyName from the executable's version resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
}

/// One open file handle surviving the cheap filters, resolved to the device
/// form of its backing path (`\Device\HarddiskVolume3\Users\...`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHandleEntry {
    pub pid: ProcessId,
    pub device_path: String,
}

/// Result of one pass over the system handle table.
///
/// `denied_pids` lists processes whose handles could not be inspected because
/// opening the owner was denied; the scanner decides whether that is a skip
/// or an abort. `skipped_handles` counts entries dropped for any other
/// per-handle reason (stale handle, non-disk file, unresolvable name).
#[derive(Debug, Clone, Default)]
pub struct HandleTableScan {
    pub entries: Vec<FileHandleEntry>,
    pub denied_pids: Vec<ProcessId>,
    pub skipped_handles: usize,
}

/// Mapping from one drive root to its kernel device prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMapping {
    /// Drive-letter root without trailing separator, e.g. `C:`.
    pub drive: String,
    /// Device prefix, e.g. `\Device\HarddiskVolume3`.
    pub device_prefix: String,
}

/// The narrow interface between live OS state and everything else.
pub trait SystemProbe: Send + Sync {
    /// Enumerate the current process list.
    ///
    /// A failure here is transient from the caller's point of view; the
    /// tracker retries on its next cycle rather than surfacing it.
    fn processes(&self) -> Result<Vec<ProcessSnapshot>>;

    /// Open a single process by id. `None` when it cannot be opened (gone,
    /// denied, or pid 0).
    fn process_snapshot(&self, pid: ProcessId) -> Option<ProcessSnapshot>;

    /// Best-effort detail query for one process.
    fn process_details(&self, pid: ProcessId) -> Result<ProcessDetails>;

    /// Parent pid as recorded in the OS process information block.
    /// `Ok(None)` when the process has no recorded parent (pid 0).
    fn parent_of(&self, pid: ProcessId) -> Result<Option<ProcessId>>;

    /// One pass over the system-wide handle table, pre-filtered to disk file
    /// objects and resolved to device paths.
    fn file_handles(&self) -> Result<HandleTableScan>;

    /// Current drive-letter to device-prefix mappings.
    fn volume_map(&self) -> Result<Vec<VolumeMapping>>;

    /// Ask a process to close itself (top-level window close request).
    /// Returns whether any close request was actually delivered.
    fn request_close(&self, pid: ProcessId) -> bool;

    /// Forcibly terminate a process. Returns whether the request was issued.
    fn kill(&self, pid: ProcessId) -> bool;

    /// Point-in-time liveness check.
    fn is_alive(&self, pid: ProcessId) -> bool;
}

/// Shared handle to a probe, cloneable across the tracker thread and callers.
pub type SharedProbe = Arc<dyn SystemProbe>;

/// Construct the live probe for this host.
#[cfg(windows)]
pub fn live_probe() -> Result<SharedProbe> {
    Ok(Arc::new(windows::WindowsProbe::new()))
}

/// Construct the live probe for this host.
#[cfg(not(windows))]
pub fn live_probe() -> Result<SharedProbe> {
    Err(Error::UnsupportedPlatform(
        std::env::consts::OS.to_string(),
    ))
}
