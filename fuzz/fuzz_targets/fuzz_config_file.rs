//! Fuzz target for config.json parsing.
//!
//! Tests that whole-file configuration parsing and validation handle
//! arbitrary input without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pf_core::config::FileConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(config) = serde_json::from_slice::<FileConfig>(data) {
        let _ = config.validate();
    }
});
