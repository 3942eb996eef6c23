//! Live Windows probe.
//!
//! The only module in the workspace that touches raw OS primitives. Process
//! listing, metadata and termination go through `sysinfo`; the handle-table
//! walk, parent-pid query, volume map, window enumeration and version
//! resources are direct Win32/NTDLL calls. Each unsafe call is wrapped in a
//! small function that returns an owned, safe value; nothing above this
//! module sees a raw handle.

use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::iter::once;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;
use std::ptr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use pf_common::{Error, ProcessId, Result};
use sysinfo::{Pid, System, Users};
use tracing::{debug, trace};

use winapi::shared::basetsd::ULONG_PTR;
use winapi::shared::minwindef::{BOOL, DWORD, FALSE, LPARAM, LPVOID, MAX_PATH, TRUE, UINT};
use winapi::shared::ntdef::{BOOLEAN, CHAR, NTSTATUS, UCHAR, ULONG, UNICODE_STRING};
use winapi::shared::ntstatus::{
    STATUS_BUFFER_OVERFLOW, STATUS_INFO_LENGTH_MISMATCH, STATUS_SUCCESS,
};
use winapi::shared::windef::HWND;
use winapi::shared::winerror::ERROR_ACCESS_DENIED;
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::fileapi::{GetFileType, GetLogicalDriveStringsW, QueryDosDeviceW};
use winapi::um::handleapi::{CloseHandle, DuplicateHandle};
use winapi::um::processthreadsapi::{GetCurrentProcess, OpenProcess, TerminateProcess};
use winapi::um::winbase::FILE_TYPE_DISK;
use winapi::um::winnt::{
    GENERIC_MAPPING, HANDLE, LPCWSTR, PROCESS_DUP_HANDLE, PROCESS_QUERY_LIMITED_INFORMATION,
    PROCESS_TERMINATE, PVOID,
};
use winapi::um::winuser::{
    EnumWindows, GetWindowTextLengthW, GetWindowTextW, GetWindowThreadProcessId, IsWindowVisible,
    PostMessageW, WM_CLOSE,
};
use winapi::um::winver::{GetFileVersionInfoSizeW, GetFileVersionInfoW, VerQueryValueW};

use super::{
    FileHandleEntry, HandleTableScan, ProcessDetails, ProcessSnapshot, SystemProbe, VolumeMapping,
};

// Information classes used through NTDLL. Values are stable ABI.
const SYSTEM_EXTENDED_HANDLE_INFORMATION: ULONG = 64;
const OBJECT_NAME_INFORMATION: ULONG = 1;
const OBJECT_TYPES_INFORMATION: ULONG = 3;
const PROCESS_BASIC_INFORMATION_CLASS: ULONG = 0;

#[link(name = "ntdll")]
extern "system" {
    fn NtQuerySystemInformation(
        system_information_class: ULONG,
        system_information: PVOID,
        system_information_length: ULONG,
        return_length: *mut ULONG,
    ) -> NTSTATUS;

    fn NtQueryObject(
        handle: HANDLE,
        object_information_class: ULONG,
        object_information: PVOID,
        object_information_length: ULONG,
        return_length: *mut ULONG,
    ) -> NTSTATUS;

    fn NtQueryInformationProcess(
        process_handle: HANDLE,
        process_information_class: ULONG,
        process_information: PVOID,
        process_information_length: ULONG,
        return_length: *mut ULONG,
    ) -> NTSTATUS;
}

#[repr(C)]
#[allow(dead_code)]
struct SystemHandleTableEntryInfoEx {
    object: PVOID,
    unique_process_id: ULONG_PTR,
    handle_value: ULONG_PTR,
    granted_access: ULONG,
    creator_back_trace_index: u16,
    object_type_index: u16,
    handle_attributes: ULONG,
    reserved: ULONG,
}

#[repr(C)]
#[allow(dead_code)]
struct SystemHandleInformationEx {
    number_of_handles: ULONG_PTR,
    reserved: ULONG_PTR,
    // Entries follow immediately after this header.
}

#[repr(C)]
struct ObjectTypesInformation {
    number_of_types: ULONG,
}

#[repr(C)]
#[allow(dead_code)]
struct ObjectTypeInformation {
    type_name: UNICODE_STRING,
    total_number_of_objects: ULONG,
    total_number_of_handles: ULONG,
    total_paged_pool_usage: ULONG,
    total_non_paged_pool_usage: ULONG,
    total_name_pool_usage: ULONG,
    total_handle_table_usage: ULONG,
    high_water_number_of_objects: ULONG,
    high_water_number_of_handles: ULONG,
    high_water_paged_pool_usage: ULONG,
    high_water_non_paged_pool_usage: ULONG,
    high_water_name_pool_usage: ULONG,
    high_water_handle_table_usage: ULONG,
    invalid_attributes: ULONG,
    generic_mapping: GENERIC_MAPPING,
    valid_access_mask: ULONG,
    security_required: BOOLEAN,
    maintain_handle_count: BOOLEAN,
    // Populated on Windows 8.1 and later, which is the supported floor.
    type_index: UCHAR,
    reserved_byte: CHAR,
    pool_type: ULONG,
    default_paged_pool_charge: ULONG,
    default_non_paged_pool_charge: ULONG,
}

#[repr(C)]
#[allow(dead_code)]
struct ProcessBasicInformation {
    exit_status: NTSTATUS,
    peb_base_address: PVOID,
    affinity_mask: ULONG_PTR,
    base_priority: i32,
    unique_process_id: ULONG_PTR,
    inherited_from_unique_process_id: ULONG_PTR,
}

/// Closes a real (non-pseudo) handle on drop.
struct OwnedHandle(HANDLE);

impl OwnedHandle {
    fn open_process(access: DWORD, pid: u32) -> Option<OwnedHandle> {
        let handle = unsafe { OpenProcess(access, FALSE, pid) };
        if handle.is_null() {
            None
        } else {
            Some(OwnedHandle(handle))
        }
    }

    fn raw(&self) -> HANDLE {
        self.0
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe {
                CloseHandle(self.0);
            }
        }
    }
}

fn to_wide(value: &OsStr) -> Vec<u16> {
    value.encode_wide().chain(once(0)).collect()
}

fn wide_str(value: &str) -> Vec<u16> {
    to_wide(OsStr::new(value))
}

fn from_wide(buffer: &[u16]) -> String {
    let end = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
    String::from_utf16_lossy(&buffer[..end])
}

fn align_up(value: usize) -> usize {
    let align = std::mem::size_of::<usize>();
    (value + align - 1) & !(align - 1)
}

/// Handles whose name query is known to deadlock inside the kernel
/// (synchronous pipes mid-I/O, certain console handles). Identified by
/// granted-access mask plus handle attributes; resolution is never attempted
/// for them.
fn is_hang_prone(granted_access: ULONG, attributes: ULONG) -> bool {
    (granted_access == 0x0012_0189 && (attributes == 0 || attributes == 2))
        || (granted_access == 0x0012_019F && (attributes == 0 || attributes == 2))
        || (granted_access == 0x001A_019F && attributes == 2)
}

/// Grow-on-mismatch NTDLL query loop. `query` is retried with the size the
/// kernel reported until it succeeds or the retry budget is exhausted (the
/// handle table keeps growing under churn).
fn query_with_retry<F>(initial: usize, what: &str, mut query: F) -> Result<Vec<u8>>
where
    F: FnMut(&mut Vec<u8>) -> (NTSTATUS, ULONG),
{
    let mut buffer = vec![0u8; initial];
    for _ in 0..8 {
        let (status, needed) = query(&mut buffer);
        if status == STATUS_SUCCESS {
            return Ok(buffer);
        }
        if status != STATUS_INFO_LENGTH_MISMATCH && status != STATUS_BUFFER_OVERFLOW {
            return Err(Error::HandleTable(format!(
                "{what} query failed with NTSTATUS {status:#010x}"
            )));
        }
        // Slack absorbs growth between the size probe and the real query.
        buffer = vec![0u8; needed as usize + 4096];
    }
    Err(Error::HandleTable(format!(
        "{what} buffer never stabilized"
    )))
}

/// Object-type index for "File" from the system object-type table.
fn file_object_type_index() -> Result<u16> {
    let buffer = query_with_retry(
        std::mem::size_of::<ObjectTypesInformation>() + 4096,
        "object types",
        |buf| {
            let mut needed: ULONG = 0;
            let status = unsafe {
                NtQueryObject(
                    ptr::null_mut(),
                    OBJECT_TYPES_INFORMATION,
                    buf.as_mut_ptr() as PVOID,
                    buf.len() as ULONG,
                    &mut needed,
                )
            };
            (status, needed)
        },
    )?;

    let count = unsafe { (*(buffer.as_ptr() as *const ObjectTypesInformation)).number_of_types };
    let mut offset = align_up(std::mem::size_of::<ObjectTypesInformation>());
    for _ in 0..count {
        if offset + std::mem::size_of::<ObjectTypeInformation>() > buffer.len() {
            break;
        }
        let info = unsafe { &*(buffer.as_ptr().add(offset) as *const ObjectTypeInformation) };
        let name_len = (info.type_name.Length / 2) as usize;
        let name = if info.type_name.Buffer.is_null() || name_len == 0 {
            String::new()
        } else {
            let chars = unsafe { std::slice::from_raw_parts(info.type_name.Buffer, name_len) };
            String::from_utf16_lossy(chars)
        };
        if name == "File" {
            return Ok(info.type_index as u16);
        }
        offset += std::mem::size_of::<ObjectTypeInformation>()
            + align_up(info.type_name.MaximumLength as usize);
    }
    Err(Error::HandleTable(
        "object-type table has no File entry".to_string(),
    ))
}

/// Device-form backing path of a duplicated file handle, or `None` when the
/// object has no name or the query is refused.
fn object_name(handle: HANDLE) -> Option<String> {
    let mut buffer = vec![0u8; 1024];
    for _ in 0..4 {
        let mut needed: ULONG = 0;
        let status = unsafe {
            NtQueryObject(
                handle,
                OBJECT_NAME_INFORMATION,
                buffer.as_mut_ptr() as PVOID,
                buffer.len() as ULONG,
                &mut needed,
            )
        };
        if status == STATUS_INFO_LENGTH_MISMATCH || status == STATUS_BUFFER_OVERFLOW {
            buffer = vec![0u8; (needed as usize).max(buffer.len() * 2)];
            continue;
        }
        if status != STATUS_SUCCESS {
            return None;
        }
        let name = unsafe { &*(buffer.as_ptr() as *const UNICODE_STRING) };
        let len = (name.Length / 2) as usize;
        if name.Buffer.is_null() || len == 0 {
            return None;
        }
        let chars = unsafe { std::slice::from_raw_parts(name.Buffer, len) };
        return Some(String::from_utf16_lossy(chars));
    }
    None
}

struct TitleSearch {
    pid: DWORD,
    title: Option<String>,
}

unsafe extern "system" fn collect_title_proc(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let search = &mut *(lparam as *mut TitleSearch);
    let mut window_pid: DWORD = 0;
    GetWindowThreadProcessId(hwnd, &mut window_pid);
    if window_pid != search.pid || IsWindowVisible(hwnd) == FALSE {
        return TRUE;
    }
    let len = GetWindowTextLengthW(hwnd);
    if len <= 0 {
        return TRUE;
    }
    let mut buffer = vec![0u16; len as usize + 1];
    let copied = GetWindowTextW(hwnd, buffer.as_mut_ptr(), buffer.len() as i32);
    if copied > 0 {
        search.title = Some(from_wide(&buffer[..copied as usize]));
        return FALSE; // First visible titled window wins.
    }
    TRUE
}

struct CloseRequest {
    pid: DWORD,
    posted: u32,
}

unsafe extern "system" fn post_close_proc(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let request = &mut *(lparam as *mut CloseRequest);
    let mut window_pid: DWORD = 0;
    GetWindowThreadProcessId(hwnd, &mut window_pid);
    if window_pid == request.pid && IsWindowVisible(hwnd) != FALSE {
        if PostMessageW(hwnd, WM_CLOSE, 0, 0) != 0 {
            request.posted += 1;
        }
    }
    TRUE
}

/// FileDescription/ProductName/CompanyName from an executable's version
/// resource, trying the resource's own translation table first and the two
/// conventional US-English encodings last.
fn version_strings(exe: &Path) -> (Option<String>, Option<String>, Option<String>) {
    let wide = to_wide(exe.as_os_str());
    let mut ignored: DWORD = 0;
    let size = unsafe { GetFileVersionInfoSizeW(wide.as_ptr(), &mut ignored) };
    if size == 0 {
        return (None, None, None);
    }
    let mut data = vec![0u8; size as usize];
    let ok = unsafe { GetFileVersionInfoW(wide.as_ptr(), 0, size, data.as_mut_ptr() as LPVOID) };
    if ok == 0 {
        return (None, None, None);
    }

    let mut translations: Vec<(u16, u16)> = Vec::new();
    let mut value: LPVOID = ptr::null_mut();
    let mut value_len: UINT = 0;
    let query = wide_str("\\VarFileInfo\\Translation");
    let found = unsafe {
        VerQueryValueW(
            data.as_ptr() as LPVOID,
            query.as_ptr() as LPCWSTR,
            &mut value,
            &mut value_len,
        )
    };
    if found != 0 && !value.is_null() {
        let pairs = unsafe {
            std::slice::from_raw_parts(value as *const u16, (value_len as usize / 4) * 2)
        };
        for chunk in pairs.chunks_exact(2) {
            translations.push((chunk[0], chunk[1]));
        }
    }
    translations.push((0x0409, 0x04B0));
    translations.push((0x0409, 0x04E4));

    let lookup = |field: &str| -> Option<String> {
        for (lang, codepage) in &translations {
            let sub_block = wide_str(&format!(
                "\\StringFileInfo\\{lang:04X}{codepage:04X}\\{field}"
            ));
            let mut text: LPVOID = ptr::null_mut();
            let mut text_len: UINT = 0;
            let found = unsafe {
                VerQueryValueW(
                    data.as_ptr() as LPVOID,
                    sub_block.as_ptr() as LPCWSTR,
                    &mut text,
                    &mut text_len,
                )
            };
            if found != 0 && !text.is_null() && text_len > 0 {
                let chars =
                    unsafe { std::slice::from_raw_parts(text as *const u16, text_len as usize) };
                let parsed = from_wide(chars);
                let trimmed = parsed.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
        None
    };

    (
        lookup("FileDescription"),
        lookup("ProductName"),
        lookup("CompanyName"),
    )
}

fn executable_base_name(raw_name: &str) -> String {
    Path::new(raw_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| raw_name.to_string())
}

fn start_time_utc(seconds_since_epoch: u64) -> Option<DateTime<Utc>> {
    if seconds_since_epoch == 0 {
        return None;
    }
    DateTime::from_timestamp(seconds_since_epoch as i64, 0)
}

/// The live probe. Holds a `sysinfo` system and user table behind mutexes so
/// the tracker thread and synchronous callers can share one instance.
pub struct WindowsProbe {
    system: Mutex<System>,
    users: Mutex<Users>,
}

impl WindowsProbe {
    pub fn new() -> Self {
        WindowsProbe {
            system: Mutex::new(System::new()),
            users: Mutex::new(Users::new_with_refreshed_list()),
        }
    }

    fn snapshot_from(process: &sysinfo::Process) -> ProcessSnapshot {
        ProcessSnapshot {
            pid: ProcessId(process.pid().as_u32()),
            name: executable_base_name(process.name()),
            exe_path: process.exe().map(|p| p.to_path_buf()),
            start_time: start_time_utc(process.start_time()),
        }
    }

    fn owner_name(&self, process: &sysinfo::Process) -> Option<String> {
        let uid = process.user_id()?.clone();
        let users = self.users.lock().ok()?;
        users.get_user_by_id(&uid).map(|user| user.name().to_string())
    }
}

impl Default for WindowsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe for WindowsProbe {
    fn processes(&self) -> Result<Vec<ProcessSnapshot>> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| Error::Enumeration("process table lock poisoned".to_string()))?;
        system.refresh_processes();
        Ok(system.processes().values().map(Self::snapshot_from).collect())
    }

    fn process_snapshot(&self, pid: ProcessId) -> Option<ProcessSnapshot> {
        if pid.0 == 0 {
            return None;
        }
        let mut system = self.system.lock().ok()?;
        let sys_pid = Pid::from_u32(pid.0);
        if !system.refresh_process(sys_pid) {
            return None;
        }
        system.process(sys_pid).map(Self::snapshot_from)
    }

    fn process_details(&self, pid: ProcessId) -> Result<ProcessDetails> {
        let sys_pid = Pid::from_u32(pid.0);
        let mut details = ProcessDetails::default();
        {
            let mut system = self
                .system
                .lock()
                .map_err(|_| Error::Enumeration("process table lock poisoned".to_string()))?;
            if !system.refresh_process(sys_pid) {
                return Err(Error::ProcessNotFound { pid: pid.0 });
            }
            let process = system
                .process(sys_pid)
                .ok_or(Error::ProcessNotFound { pid: pid.0 })?;
            details.exe_path = process.exe().map(|p| p.display().to_string());
            details.working_directory = process.cwd().map(|p| p.display().to_string());
            let cmd = process.cmd();
            if !cmd.is_empty() {
                details.command_line = Some(cmd.join(" "));
            }
            details.start_time = start_time_utc(process.start_time());
            details.owning_user = self.owner_name(process);
        }

        let mut search = TitleSearch { pid: pid.0, title: None };
        unsafe {
            EnumWindows(Some(collect_title_proc), &mut search as *mut TitleSearch as LPARAM);
        }
        details.main_window_title = search.title;

        if let Some(exe) = details.exe_path.as_deref() {
            let (description, product, company) = version_strings(Path::new(exe));
            details.file_description = description;
            details.product_name = product;
            details.company_name = company;
        }
        Ok(details)
    }

    fn parent_of(&self, pid: ProcessId) -> Result<Option<ProcessId>> {
        if pid.0 == 0 {
            return Ok(None);
        }
        let handle = OwnedHandle::open_process(PROCESS_QUERY_LIMITED_INFORMATION, pid.0)
            .ok_or(Error::ProcessNotFound { pid: pid.0 })?;
        let mut info: ProcessBasicInformation = unsafe { std::mem::zeroed() };
        let mut returned: ULONG = 0;
        let status = unsafe {
            NtQueryInformationProcess(
                handle.raw(),
                PROCESS_BASIC_INFORMATION_CLASS,
                &mut info as *mut ProcessBasicInformation as PVOID,
                std::mem::size_of::<ProcessBasicInformation>() as ULONG,
                &mut returned,
            )
        };
        if status != STATUS_SUCCESS {
            return Err(Error::Enumeration(format!(
                "parent query for pid {pid} failed with NTSTATUS {status:#010x}"
            )));
        }
        let parent = info.inherited_from_unique_process_id as u32;
        Ok(if parent == 0 {
            None
        } else {
            Some(ProcessId(parent))
        })
    }

    fn file_handles(&self) -> Result<HandleTableScan> {
        let file_index = file_object_type_index()?;
        let buffer = query_with_retry(0x10000, "handle table", |buf| {
            let mut needed: ULONG = 0;
            let status = unsafe {
                NtQuerySystemInformation(
                    SYSTEM_EXTENDED_HANDLE_INFORMATION,
                    buf.as_mut_ptr() as PVOID,
                    buf.len() as ULONG,
                    &mut needed,
                )
            };
            (status, needed)
        })?;

        let header_size = std::mem::size_of::<SystemHandleInformationEx>();
        let entry_size = std::mem::size_of::<SystemHandleTableEntryInfoEx>();
        let count =
            unsafe { (*(buffer.as_ptr() as *const SystemHandleInformationEx)).number_of_handles };
        let usable = buffer.len().saturating_sub(header_size) / entry_size;
        let count = (count as usize).min(usable);
        trace!(handle_count = count, file_type_index = file_index, "handle table snapshot");

        let current_process = unsafe { GetCurrentProcess() };
        let mut scan = HandleTableScan::default();
        let mut denied: HashSet<u32> = HashSet::new();
        // Process handles are opened once per owning pid and reused across
        // that pid's handle entries.
        let mut opened: HashMap<u32, Option<OwnedHandle>> = HashMap::new();

        for i in 0..count {
            let entry = unsafe {
                &*(buffer.as_ptr().add(header_size + i * entry_size)
                    as *const SystemHandleTableEntryInfoEx)
            };
            if entry.object_type_index != file_index {
                continue;
            }
            if is_hang_prone(entry.granted_access, entry.handle_attributes) {
                scan.skipped_handles += 1;
                continue;
            }
            let owner_pid = entry.unique_process_id as u32;
            if owner_pid == 0 {
                continue;
            }
            if denied.contains(&owner_pid) {
                scan.skipped_handles += 1;
                continue;
            }

            let process_handle = opened.entry(owner_pid).or_insert_with(|| {
                let handle = OwnedHandle::open_process(PROCESS_DUP_HANDLE, owner_pid);
                if handle.is_none() && unsafe { GetLastError() } == ERROR_ACCESS_DENIED {
                    denied.insert(owner_pid);
                }
                handle
            });
            let process_handle = match process_handle {
                Some(handle) => handle,
                None => {
                    scan.skipped_handles += 1;
                    continue;
                }
            };

            let mut duplicate: HANDLE = ptr::null_mut();
            let duplicated = unsafe {
                DuplicateHandle(
                    process_handle.raw(),
                    entry.handle_value as HANDLE,
                    current_process,
                    &mut duplicate,
                    0,
                    FALSE,
                    winapi::um::winnt::DUPLICATE_SAME_ACCESS,
                )
            };
            if duplicated == 0 || duplicate.is_null() {
                scan.skipped_handles += 1;
                continue;
            }
            // Owns the duplicate from here; closed on every exit path.
            let duplicate = OwnedHandle(duplicate);

            if unsafe { GetFileType(duplicate.raw()) } != FILE_TYPE_DISK {
                scan.skipped_handles += 1;
                continue;
            }
            let device_path = match object_name(duplicate.raw()) {
                Some(name) => name,
                None => {
                    scan.skipped_handles += 1;
                    continue;
                }
            };
            if !device_path.starts_with(r"\Device\HarddiskVolume") {
                scan.skipped_handles += 1;
                continue;
            }
            scan.entries.push(FileHandleEntry {
                pid: ProcessId(owner_pid),
                device_path,
            });
        }

        scan.denied_pids = denied.into_iter().map(ProcessId).collect();
        debug!(
            resolved = scan.entries.len(),
            skipped = scan.skipped_handles,
            denied_processes = scan.denied_pids.len(),
            "handle table walk complete"
        );
        Ok(scan)
    }

    fn volume_map(&self) -> Result<Vec<VolumeMapping>> {
        let mut drives = [0u16; 512];
        let written =
            unsafe { GetLogicalDriveStringsW(drives.len() as DWORD, drives.as_mut_ptr()) };
        if written == 0 {
            return Err(Error::Enumeration(
                "logical drive enumeration failed".to_string(),
            ));
        }

        let mut mappings = Vec::new();
        for root in drives[..written as usize]
            .split(|&c| c == 0)
            .filter(|chunk| !chunk.is_empty())
        {
            let root = String::from_utf16_lossy(root);
            let drive = root.trim_end_matches('\\').to_string();
            let query = wide_str(&drive);
            let mut target = [0u16; MAX_PATH as usize * 2];
            let length =
                unsafe { QueryDosDeviceW(query.as_ptr(), target.as_mut_ptr(), target.len() as DWORD) };
            if length == 0 {
                continue;
            }
            for device in target[..length as usize]
                .split(|&c| c == 0)
                .filter(|chunk| !chunk.is_empty())
            {
                mappings.push(VolumeMapping {
                    drive: drive.clone(),
                    device_prefix: String::from_utf16_lossy(device),
                });
            }
        }
        Ok(mappings)
    }

    fn request_close(&self, pid: ProcessId) -> bool {
        let mut request = CloseRequest { pid: pid.0, posted: 0 };
        unsafe {
            EnumWindows(Some(post_close_proc), &mut request as *mut CloseRequest as LPARAM);
        }
        debug!(pid = pid.0, windows = request.posted, "posted close requests");
        request.posted > 0
    }

    fn kill(&self, pid: ProcessId) -> bool {
        match OwnedHandle::open_process(PROCESS_TERMINATE, pid.0) {
            Some(handle) => unsafe { TerminateProcess(handle.raw(), 1) != 0 },
            None => false,
        }
    }

    fn is_alive(&self, pid: ProcessId) -> bool {
        if pid.0 == 0 {
            return false;
        }
        match self.system.lock() {
            Ok(mut system) => system.refresh_process(Pid::from_u32(pid.0)),
            Err(_) => false,
        }
    }
}
