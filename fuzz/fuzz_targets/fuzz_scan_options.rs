//! Fuzz target for scan options parsing.
//!
//! Tests that JSON scan-option parsing and semantic validation handle
//! arbitrary input without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pf_core::lockscan::ScanOptions;

fuzz_target!(|data: &[u8]| {
    // Parsing may fail, validation may reject; neither may panic.
    if let Ok(options) = serde_json::from_slice::<ScanOptions>(data) {
        let _ = options.validate();
    }
});
