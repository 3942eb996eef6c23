//! File lock scanning.
//!
//! Answers "which processes hold open handles under these paths" by walking
//! the system handle table, translating kernel device paths to drive-letter
//! form and matching them against the expanded candidate set. One metadata
//! fetch per locking process; results are grouped per process and ordered by
//! pid.

pub mod paths;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use pf_common::{Error, ProcessId, Result};

use crate::sys::SharedProbe;

/// Reported instead of an executable path when process metadata is refused.
pub const EXECUTABLE_ACCESS_DENIED: &str = "Access Denied";
/// Reported when the owning account cannot be resolved.
pub const OWNER_UNKNOWN: &str = "Unknown";

fn default_max_depth() -> i32 {
    2
}

fn default_continue_on_access_denied() -> bool {
    true
}

/// Scan behavior knobs.
///
/// `max_depth` bounds recursive expansion: `0` keeps each root alone, `-1`
/// removes the limit. Any other negative value is a configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanOptions {
    #[serde(default)]
    pub recursive: bool,
    #[serde(default = "default_max_depth")]
    pub max_depth: i32,
    #[serde(default = "default_continue_on_access_denied")]
    pub continue_on_access_denied: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            recursive: false,
            max_depth: default_max_depth(),
            continue_on_access_denied: default_continue_on_access_denied(),
        }
    }
}

impl ScanOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_depth < -1 {
            return Err(Error::InvalidScanOptions(format!(
                "max_depth must be -1 (unbounded) or >= 0, got {}",
                self.max_depth
            )));
        }
        Ok(())
    }
}

/// One process holding at least one matching handle. `locked_paths` is the
/// deduplicated set of matching paths in drive-letter form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedProcessRecord {
    pub pid: ProcessId,
    pub process_name: String,
    /// Empty for windowless processes.
    pub main_window_title: String,
    pub executable_path: String,
    pub owning_user: String,
    pub start_time: Option<DateTime<Utc>>,
    pub locked_paths: BTreeSet<String>,
    pub working_directory: Option<String>,
    pub command_line: Option<String>,
}

/// Result of one scan pass, with the diagnostics needed to judge coverage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub records: Vec<LockedProcessRecord>,
    /// Processes that refused handle duplication; their handles are unseen.
    pub denied_processes: Vec<ProcessId>,
    /// Handles skipped without resolution (hang-prone or undupable).
    pub skipped_handles: usize,
    pub candidate_count: usize,
}

/// Scanner over a [`SystemProbe`]. Stateless between calls; every scan sees
/// fresh handle-table and process state.
pub struct LockScanner {
    probe: SharedProbe,
}

impl LockScanner {
    pub fn new(probe: SharedProbe) -> Self {
        LockScanner { probe }
    }

    /// Find all processes with an open handle on any candidate path under
    /// `roots`. Handle-table or volume-map failure fails the scan; a refusal
    /// by an individual process only does so when
    /// `continue_on_access_denied` is off, in which case partial results are
    /// discarded.
    pub fn find_locking_processes(
        &self,
        roots: &[String],
        options: &ScanOptions,
    ) -> Result<ScanOutcome> {
        options.validate()?;

        let candidates = paths::expand_roots(roots, options)?;
        if candidates.is_empty() {
            debug!("no scan candidates, skipping handle table walk");
            return Ok(ScanOutcome::default());
        }

        let scan = self.probe.file_handles()?;
        if !options.continue_on_access_denied && !scan.denied_pids.is_empty() {
            return Err(Error::AccessDenied {
                context: format!(
                    "{} process(es) refused handle duplication",
                    scan.denied_pids.len()
                ),
            });
        }
        let volumes = self.probe.volume_map()?;

        let mut matched: BTreeMap<ProcessId, BTreeSet<String>> = BTreeMap::new();
        for entry in &scan.entries {
            let translated = match paths::translate_device_path(&entry.device_path, &volumes) {
                Some(path) => path,
                // No drive letter for this volume; nothing to report against.
                None => continue,
            };
            if paths::matches_candidates(&translated, &candidates) {
                matched.entry(entry.pid).or_default().insert(translated);
            }
        }

        let mut records = Vec::with_capacity(matched.len());
        for (pid, locked_paths) in matched {
            match self.build_record(pid, locked_paths) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(err) => return Err(err),
            }
        }

        info!(
            locking_processes = records.len(),
            denied_processes = scan.denied_pids.len(),
            skipped_handles = scan.skipped_handles,
            candidates = candidates.len(),
            "lock scan complete"
        );
        Ok(ScanOutcome {
            records,
            denied_processes: scan.denied_pids,
            skipped_handles: scan.skipped_handles,
            candidate_count: candidates.len(),
        })
    }

    /// One metadata fetch per locking process. `None` when the process
    /// exited between the handle walk and this fetch.
    fn build_record(
        &self,
        pid: ProcessId,
        locked_paths: BTreeSet<String>,
    ) -> Result<Option<LockedProcessRecord>> {
        let snapshot = match self.probe.process_snapshot(pid) {
            Some(snapshot) => snapshot,
            None => {
                debug!(pid = pid.0, "locking process exited before metadata fetch");
                return Ok(None);
            }
        };
        match self.probe.process_details(pid) {
            Ok(details) => Ok(Some(LockedProcessRecord {
                pid,
                process_name: snapshot.name,
                main_window_title: details.main_window_title.unwrap_or_default(),
                executable_path: details
                    .exe_path
                    .or_else(|| snapshot.exe_path.map(|p| p.display().to_string()))
                    .unwrap_or_else(|| EXECUTABLE_ACCESS_DENIED.to_string()),
                owning_user: details
                    .owning_user
                    .unwrap_or_else(|| OWNER_UNKNOWN.to_string()),
                start_time: details.start_time.or(snapshot.start_time),
                locked_paths,
                working_directory: details.working_directory,
                command_line: details.command_line,
            })),
            Err(Error::AccessDenied { .. }) => Ok(Some(LockedProcessRecord {
                pid,
                process_name: snapshot.name,
                main_window_title: String::new(),
                executable_path: EXECUTABLE_ACCESS_DENIED.to_string(),
                owning_user: OWNER_UNKNOWN.to_string(),
                start_time: snapshot.start_time,
                locked_paths,
                working_directory: None,
                command_line: None,
            })),
            Err(Error::ProcessNotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }
}
