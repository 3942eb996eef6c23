//! Path normalization, candidate expansion and device-path translation.
//!
//! Matching is exact set membership: a resolved handle path locks a scan
//! root only if its normalized form is one of the candidates produced by
//! [`expand_roots`]. Normalization lowercases and converts separators so the
//! comparison is insensitive to case and slash direction, which is how NTFS
//! resolves names.

use std::collections::BTreeSet;
use std::io::ErrorKind;

use tracing::{debug, trace};
use walkdir::WalkDir;

use pf_common::{Error, Result};

use crate::sys::VolumeMapping;

use super::ScanOptions;

/// Canonical comparison form: backslash separators, no trailing separator,
/// Unicode-lowercased.
pub fn normalize_path(path: &str) -> String {
    let swapped = path.replace('/', "\\");
    let trimmed = swapped.trim_end_matches('\\');
    if trimmed.is_empty() {
        // A bare separator is the filesystem root.
        return "\\".to_string();
    }
    trimmed.to_lowercase()
}

/// Expand scan roots into the candidate set.
///
/// With `recursive` off this is the literal roots, untouched by the
/// filesystem. With it on, every file and directory under each root is added
/// down to `max_depth` levels (`0` keeps the root alone, `-1` removes the
/// limit). Roots that do not exist contribute nothing. Unreadable
/// directories are skipped or abort the expansion according to
/// `continue_on_access_denied`.
pub fn expand_roots(roots: &[String], options: &ScanOptions) -> Result<BTreeSet<String>> {
    let mut candidates = BTreeSet::new();

    if !options.recursive {
        for root in roots {
            candidates.insert(normalize_path(root));
        }
        return Ok(candidates);
    }

    for root in roots {
        let mut walker = WalkDir::new(root);
        if options.max_depth >= 0 {
            walker = walker.max_depth(options.max_depth as usize);
        }
        for entry in walker {
            match entry {
                Ok(entry) => {
                    candidates.insert(normalize_path(&entry.path().to_string_lossy()));
                }
                Err(err) => {
                    let kind = err.io_error().map(|e| e.kind());
                    let at = err
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| root.clone());
                    match kind {
                        Some(ErrorKind::NotFound) => {
                            debug!(path = %at, "scan root or entry vanished, skipping");
                        }
                        Some(ErrorKind::PermissionDenied) if !options.continue_on_access_denied => {
                            return Err(Error::AccessDenied { context: at });
                        }
                        _ => {
                            debug!(path = %at, error = %err, "unreadable entry skipped");
                        }
                    }
                }
            }
        }
    }
    trace!(candidates = candidates.len(), "expanded scan roots");
    Ok(candidates)
}

/// Translate a kernel device path (`\Device\HarddiskVolume3\...`) to
/// drive-letter form, keeping the original casing of the tail. Returns `None`
/// for devices with no drive mapping.
pub fn translate_device_path(device_path: &str, volumes: &[VolumeMapping]) -> Option<String> {
    let key = device_key(device_path)?;
    let mapping = volumes
        .iter()
        .find(|m| m.device_prefix.eq_ignore_ascii_case(key))?;
    let rest = &device_path[key.len()..];
    Some(format!("{}{}", mapping.drive, rest))
}

/// First two components of a device path, which name the volume:
/// `\Device\HarddiskVolume3\Users\x` yields `\Device\HarddiskVolume3`.
fn device_key(device_path: &str) -> Option<&str> {
    let rest = device_path.strip_prefix('\\')?;
    let first = rest.find('\\')?;
    let second = rest[first + 1..].find('\\');
    match second {
        Some(offset) => Some(&device_path[..1 + first + 1 + offset]),
        // The path names the volume itself.
        None => Some(device_path),
    }
}

/// True if the normalized form of `path` is one of the candidates.
pub fn matches_candidates(path: &str, candidates: &BTreeSet<String>) -> bool {
    candidates.contains(&normalize_path(path))
}
