//! Fuzz target for path normalization and candidate matching.
//!
//! Tests that `normalize_path` handles arbitrary input without panicking,
//! that it is idempotent, and that a path always matches a candidate set
//! seeded with its own normalized form.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pf_core::lockscan::paths::{matches_candidates, normalize_path};
use std::collections::BTreeSet;

fuzz_target!(|data: &str| {
    let normalized = normalize_path(data);
    // Normalizing an already normalized path must be a no-op.
    assert_eq!(normalize_path(&normalized), normalized);

    let mut candidates = BTreeSet::new();
    candidates.insert(normalized);
    assert!(matches_candidates(data, &candidates));
});
