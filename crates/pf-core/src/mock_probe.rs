//! In-memory probe for tests.
//!
//! `MockProbe` implements [`SystemProbe`] over a scripted process table so
//! scanner, tracker and close-apps flows can be exercised deterministically
//! on any platform. Builder methods (`with_*`) set up the initial world;
//! interior-mutability methods (`spawn`, `terminate`, ...) change it while a
//! component under test is running.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, TimeZone, Utc};
use pf_common::{Error, ProcessId, Result};

use crate::sys::{
    FileHandleEntry, HandleTableScan, ProcessDetails, ProcessSnapshot, SharedProbe, SystemProbe,
    VolumeMapping,
};

#[derive(Debug, Clone)]
struct MockProcess {
    name: String,
    details: ProcessDetails,
    alive: bool,
    closes_on_request: bool,
    unkillable: bool,
    details_denied: bool,
}

#[derive(Debug, Default)]
struct MockState {
    processes: HashMap<u32, MockProcess>,
    handles: Vec<FileHandleEntry>,
    denied_pids: Vec<ProcessId>,
    skipped_handles: usize,
    volumes: Vec<VolumeMapping>,
    parents: HashMap<u32, u32>,
    fail_enumerations: u32,
    fail_handle_table: bool,
    close_log: Vec<ProcessId>,
    kill_log: Vec<ProcessId>,
}

/// Scripted [`SystemProbe`] for tests.
#[derive(Debug, Default)]
pub struct MockProbe {
    state: Mutex<MockState>,
}

/// Deterministic start time for scripted processes, offset by pid so records
/// stay distinguishable.
fn synthetic_start_time(pid: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + chrono::Duration::seconds(pid as i64)
}

impl MockProbe {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock probe state poisoned")
    }

    /// Wrap in the shared handle the components take.
    pub fn shared(self) -> SharedProbe {
        Arc::new(self)
    }

    /// Register a running process. `name` follows the probe convention of an
    /// executable base name without extension.
    pub fn with_process(self, pid: u32, name: &str) -> Self {
        {
            let mut state = self.state();
            let details = ProcessDetails {
                exe_path: Some(format!("C:\\Program Files\\{name}\\{name}.exe")),
                start_time: Some(synthetic_start_time(pid)),
                ..ProcessDetails::default()
            };
            state.processes.insert(
                pid,
                MockProcess {
                    name: name.to_string(),
                    details,
                    alive: true,
                    closes_on_request: true,
                    unkillable: false,
                    details_denied: false,
                },
            );
        }
        self
    }

    /// Adjust the scripted metadata for a registered process.
    pub fn with_details(self, pid: u32, edit: impl FnOnce(&mut ProcessDetails)) -> Self {
        {
            let mut state = self.state();
            if let Some(process) = state.processes.get_mut(&pid) {
                edit(&mut process.details);
            }
        }
        self
    }

    /// Mark a process as refusing metadata queries.
    pub fn with_details_denied(self, pid: u32) -> Self {
        {
            let mut state = self.state();
            if let Some(process) = state.processes.get_mut(&pid) {
                process.details_denied = true;
            }
        }
        self
    }

    /// Register an open file handle in device-path form.
    pub fn with_handle(self, pid: u32, device_path: &str) -> Self {
        {
            let mut state = self.state();
            state.handles.push(FileHandleEntry {
                pid: ProcessId(pid),
                device_path: device_path.to_string(),
            });
        }
        self
    }

    /// Register a drive-letter mapping, e.g. `("C:", "\\Device\\HarddiskVolume3")`.
    pub fn with_volume(self, drive: &str, device_prefix: &str) -> Self {
        {
            let mut state = self.state();
            state.volumes.push(VolumeMapping {
                drive: drive.to_string(),
                device_prefix: device_prefix.to_string(),
            });
        }
        self
    }

    /// Record a parent relationship for ancestry walks.
    pub fn with_parent(self, child: u32, parent: u32) -> Self {
        {
            let mut state = self.state();
            state.parents.insert(child, parent);
        }
        self
    }

    /// Mark a pid as denying handle duplication during table walks.
    pub fn with_denied_pid(self, pid: u32) -> Self {
        {
            let mut state = self.state();
            state.denied_pids.push(ProcessId(pid));
        }
        self
    }

    /// Report handles the walk skipped without resolving.
    pub fn with_skipped_handles(self, count: usize) -> Self {
        {
            let mut state = self.state();
            state.skipped_handles = count;
        }
        self
    }

    // Runtime control, used while a component is polling.

    pub fn spawn(&self, pid: u32, name: &str) {
        let mut state = self.state();
        let details = ProcessDetails {
            exe_path: Some(format!("C:\\Program Files\\{name}\\{name}.exe")),
            start_time: Some(synthetic_start_time(pid)),
            ..ProcessDetails::default()
        };
        state.processes.insert(
            pid,
            MockProcess {
                name: name.to_string(),
                details,
                alive: true,
                closes_on_request: true,
                unkillable: false,
                details_denied: false,
            },
        );
    }

    pub fn terminate(&self, pid: u32) {
        let mut state = self.state();
        if let Some(process) = state.processes.get_mut(&pid) {
            process.alive = false;
        }
    }

    /// Ignore both graceful close and kill for this pid.
    pub fn set_unkillable(&self, pid: u32) {
        let mut state = self.state();
        if let Some(process) = state.processes.get_mut(&pid) {
            process.closes_on_request = false;
            process.unkillable = true;
        }
    }

    /// Keep running after a close request; only kill works.
    pub fn set_ignores_close(&self, pid: u32) {
        let mut state = self.state();
        if let Some(process) = state.processes.get_mut(&pid) {
            process.closes_on_request = false;
        }
    }

    /// Fail the next `count` process enumerations with a transient error.
    pub fn fail_next_enumerations(&self, count: u32) {
        self.state().fail_enumerations = count;
    }

    pub fn set_handle_table_error(&self, fail: bool) {
        self.state().fail_handle_table = fail;
    }

    /// Pids that received a graceful close request, in call order.
    pub fn close_requests(&self) -> Vec<ProcessId> {
        self.state().close_log.clone()
    }

    /// Pids that received a forced kill, in call order.
    pub fn kill_requests(&self) -> Vec<ProcessId> {
        self.state().kill_log.clone()
    }
}

impl SystemProbe for MockProbe {
    fn processes(&self) -> Result<Vec<ProcessSnapshot>> {
        let mut state = self.state();
        if state.fail_enumerations > 0 {
            state.fail_enumerations -= 1;
            return Err(Error::Enumeration("scripted enumeration failure".to_string()));
        }
        let mut snapshots: Vec<ProcessSnapshot> = state
            .processes
            .iter()
            .filter(|(_, p)| p.alive)
            .map(|(pid, p)| ProcessSnapshot {
                pid: ProcessId(*pid),
                name: p.name.clone(),
                exe_path: p.details.exe_path.as_deref().map(Into::into),
                start_time: p.details.start_time,
            })
            .collect();
        snapshots.sort_by_key(|s| s.pid);
        Ok(snapshots)
    }

    fn process_snapshot(&self, pid: ProcessId) -> Option<ProcessSnapshot> {
        let state = self.state();
        let process = state.processes.get(&pid.0).filter(|p| p.alive)?;
        Some(ProcessSnapshot {
            pid,
            name: process.name.clone(),
            exe_path: process.details.exe_path.as_deref().map(Into::into),
            start_time: process.details.start_time,
        })
    }

    fn process_details(&self, pid: ProcessId) -> Result<ProcessDetails> {
        let state = self.state();
        let process = state
            .processes
            .get(&pid.0)
            .filter(|p| p.alive)
            .ok_or(Error::ProcessNotFound { pid: pid.0 })?;
        if process.details_denied {
            return Err(Error::AccessDenied {
                context: format!("metadata for pid {pid}"),
            });
        }
        Ok(process.details.clone())
    }

    fn parent_of(&self, pid: ProcessId) -> Result<Option<ProcessId>> {
        let state = self.state();
        if !state.processes.get(&pid.0).map(|p| p.alive).unwrap_or(false) {
            return Err(Error::ProcessNotFound { pid: pid.0 });
        }
        Ok(state.parents.get(&pid.0).copied().map(ProcessId))
    }

    fn file_handles(&self) -> Result<HandleTableScan> {
        let state = self.state();
        if state.fail_handle_table {
            return Err(Error::HandleTable("scripted handle table failure".to_string()));
        }
        // Handles of a process scripted dead disappear with it. A handle for
        // a pid never registered stays visible, modelling a table entry that
        // outlives its process.
        let entries = state
            .handles
            .iter()
            .filter(|h| match state.processes.get(&h.pid.0) {
                Some(process) => process.alive,
                None => true,
            })
            .cloned()
            .collect();
        Ok(HandleTableScan {
            entries,
            denied_pids: state.denied_pids.clone(),
            skipped_handles: state.skipped_handles,
        })
    }

    fn volume_map(&self) -> Result<Vec<VolumeMapping>> {
        Ok(self.state().volumes.clone())
    }

    fn request_close(&self, pid: ProcessId) -> bool {
        let mut state = self.state();
        state.close_log.push(pid);
        match state.processes.get_mut(&pid.0) {
            Some(process) if process.alive => {
                if process.closes_on_request {
                    process.alive = false;
                }
                true
            }
            _ => false,
        }
    }

    fn kill(&self, pid: ProcessId) -> bool {
        let mut state = self.state();
        state.kill_log.push(pid);
        match state.processes.get_mut(&pid.0) {
            Some(process) if process.alive => {
                if process.unkillable {
                    false
                } else {
                    process.alive = false;
                    true
                }
            }
            _ => false,
        }
    }

    fn is_alive(&self, pid: ProcessId) -> bool {
        self.state()
            .processes
            .get(&pid.0)
            .map(|p| p.alive)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminate_hides_process_and_handles() {
        let probe = MockProbe::new()
            .with_process(100, "notepad")
            .with_handle(100, r"\Device\HarddiskVolume3\Temp\open.txt");
        assert!(probe.is_alive(ProcessId(100)));
        assert_eq!(probe.file_handles().unwrap().entries.len(), 1);

        probe.terminate(100);
        assert!(!probe.is_alive(ProcessId(100)));
        assert!(probe.processes().unwrap().is_empty());
        assert!(probe.file_handles().unwrap().entries.is_empty());
    }

    #[test]
    fn test_scripted_enumeration_failures_are_transient() {
        let probe = MockProbe::new().with_process(1, "a");
        probe.fail_next_enumerations(2);
        assert!(probe.processes().is_err());
        assert!(probe.processes().is_err());
        assert_eq!(probe.processes().unwrap().len(), 1);
    }

    #[test]
    fn test_unkillable_process_survives_close_and_kill() {
        let probe = MockProbe::new().with_process(7, "stubborn");
        probe.set_unkillable(7);
        assert!(probe.request_close(ProcessId(7)));
        assert!(probe.is_alive(ProcessId(7)));
        assert!(!probe.kill(ProcessId(7)));
        assert!(probe.is_alive(ProcessId(7)));
        assert_eq!(probe.close_requests(), vec![ProcessId(7)]);
        assert_eq!(probe.kill_requests(), vec![ProcessId(7)]);
    }
}
