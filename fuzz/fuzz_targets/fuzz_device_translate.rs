//! Fuzz target for kernel device-path translation.
//!
//! Tests that `translate_device_path` handles arbitrary input without
//! panicking, and that any successful translation starts with the mapped
//! drive.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pf_core::lockscan::paths::translate_device_path;
use pf_core::sys::VolumeMapping;

fuzz_target!(|data: &str| {
    let volumes = [
        VolumeMapping {
            drive: "C:".to_string(),
            device_prefix: r"\Device\HarddiskVolume3".to_string(),
        },
        VolumeMapping {
            drive: "D:".to_string(),
            device_prefix: r"\Device\HarddiskVolume30".to_string(),
        },
    ];
    if let Some(translated) = translate_device_path(data, &volumes) {
        assert!(translated.starts_with("C:") || translated.starts_with("D:"));
    }
});
