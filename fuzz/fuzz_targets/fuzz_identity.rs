//! Fuzz target for process identity matching.
//!
//! Tests that identity construction and name matching handle arbitrary
//! input without panicking, and that matching is symmetric.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pf_common::identity::names_match;
use pf_common::ProcessIdentity;

fuzz_target!(|data: (&str, &str)| {
    let (a, b) = data;
    assert_eq!(names_match(a, b), names_match(b, a));

    let identity = ProcessIdentity::new(a);
    // An identity always matches its own executable name.
    assert!(identity.matches(identity.executable_name()));
    let _ = identity.key();
    let _ = identity.display_name();
});
