//! Preflight Core Library
//!
//! This library provides the pre-flight process introspection a deployment
//! workflow runs before touching files:
//! - Lock scanning: which process holds an open handle on which file
//! - Close-list evaluation, liveness checks, and graceful close with escalation
//! - Background tracking of target processes with start/exit events
//! - The close-apps countdown session that turns all of it into one decision
//!
//! All live-system access goes through the [`sys::SystemProbe`] trait; the
//! Windows implementation is the only live one, and every other module is
//! platform-neutral and testable against the mock probe.
//!
//! The binary entry point is in `main.rs`.

pub mod ancestry;
pub mod closeapps;
pub mod config;
pub mod events;
pub mod exit_codes;
pub mod lockscan;
pub mod logging;
pub mod output;
pub mod sys;
pub mod track;

// Re-export test utilities for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod mock_probe;
