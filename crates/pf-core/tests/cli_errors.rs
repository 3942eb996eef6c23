//! CLI error handling tests for the preflight binary.
//!
//! These tests verify that invalid arguments, malformed configuration and
//! unsupported hosts produce the documented exit codes: 10 for usage errors,
//! 11 for configuration errors, 12 for platform errors.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a Command for the preflight binary.
fn preflight() -> Command {
    Command::cargo_bin("preflight").expect("preflight binary should exist")
}

// ============================================================================
// Invalid Subcommand Tests
// ============================================================================

mod invalid_subcommand {
    use super::*;

    #[test]
    fn unknown_command_fails() {
        preflight()
            .arg("nonexistent-command")
            .assert()
            .failure()
            .code(predicate::eq(10))
            .stderr(predicate::str::contains("error"));
    }

    #[test]
    fn unknown_command_suggests_similar() {
        // clap should still point at the unknown token for typos.
        preflight()
            .arg("scna")
            .assert()
            .failure()
            .stderr(predicate::str::contains("scna"));
    }
}

// ============================================================================
// Invalid Option Tests
// ============================================================================

mod invalid_options {
    use super::*;

    #[test]
    fn unknown_global_flag_fails() {
        preflight()
            .arg("--nonexistent-flag")
            .assert()
            .failure()
            .code(predicate::eq(10))
            .stderr(predicate::str::contains("error"));
    }

    #[test]
    fn invalid_format_value_fails() {
        preflight()
            .args(["--format", "badformat", "running", "winword"])
            .assert()
            .failure()
            .code(predicate::eq(10))
            .stderr(predicate::str::contains("badformat"));
    }

    #[test]
    fn missing_required_value_fails() {
        preflight()
            .args(["running", "winword", "--format"])
            .assert()
            .failure()
            .code(predicate::eq(10))
            .stderr(predicate::str::contains("error"));
    }
}

// ============================================================================
// Missing Required Argument Tests
// ============================================================================

mod missing_arguments {
    use super::*;

    #[test]
    fn scan_requires_roots() {
        preflight()
            .arg("scan")
            .assert()
            .failure()
            .code(predicate::eq(10));
    }

    #[test]
    fn evaluate_requires_names() {
        preflight()
            .arg("evaluate")
            .assert()
            .failure()
            .code(predicate::eq(10));
    }

    #[test]
    fn running_requires_name() {
        preflight()
            .arg("running")
            .assert()
            .failure()
            .code(predicate::eq(10));
    }

    #[test]
    fn ancestry_requires_pid() {
        preflight()
            .arg("ancestry")
            .assert()
            .failure()
            .code(predicate::eq(10));
    }

    #[test]
    fn closeapps_requires_names() {
        preflight()
            .arg("closeapps")
            .assert()
            .failure()
            .code(predicate::eq(10));
    }

    #[test]
    fn completions_requires_shell() {
        preflight()
            .arg("completions")
            .assert()
            .failure()
            .code(predicate::eq(10));
    }
}

// ============================================================================
// Numeric Argument Error Tests
// ============================================================================

mod numeric_errors {
    use super::*;

    #[test]
    fn ancestry_pid_rejects_non_numeric() {
        preflight()
            .args(["ancestry", "not-a-pid"])
            .assert()
            .failure()
            .code(predicate::eq(10))
            .stderr(predicate::str::contains("error"));
    }

    #[test]
    fn scan_max_depth_rejects_non_numeric() {
        preflight()
            .args(["scan", "--max-depth", "deep", "C:\\Data"])
            .assert()
            .failure()
            .code(predicate::eq(10))
            .stderr(predicate::str::contains("error"));
    }

    #[test]
    fn scan_max_depth_rejects_below_unbounded() {
        // -2 parses as an i32 but fails option validation.
        preflight()
            .args(["scan", "--max-depth=-2", "C:\\Data"])
            .assert()
            .failure()
            .code(predicate::eq(10))
            .stdout(predicate::str::contains(r#""code":11"#));
    }

    #[test]
    fn closeapps_countdown_rejects_non_numeric() {
        preflight()
            .args(["closeapps", "--countdown-s", "soon", "winword"])
            .assert()
            .failure()
            .code(predicate::eq(10))
            .stderr(predicate::str::contains("error"));
    }

    #[test]
    fn watch_interval_rejects_non_numeric() {
        preflight()
            .args(["watch", "--interval-ms", "fast", "winword"])
            .assert()
            .failure()
            .code(predicate::eq(10))
            .stderr(predicate::str::contains("error"));
    }
}

// ============================================================================
// Configuration Error Tests
// ============================================================================

mod config_errors {
    use super::*;

    #[test]
    fn explicit_missing_config_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope.json");
        preflight()
            .arg("--config")
            .arg(&missing)
            .args(["running", "winword"])
            .assert()
            .failure()
            .code(predicate::eq(11))
            .stdout(predicate::str::contains(r#""category":"config""#));
    }

    #[test]
    fn malformed_config_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let mut file = std::fs::File::create(&path).expect("create config");
        file.write_all(b"{ not json").expect("write config");

        preflight()
            .arg("--config")
            .arg(&path)
            .args(["running", "winword"])
            .assert()
            .failure()
            .code(predicate::eq(11))
            .stdout(predicate::str::contains(r#""category":"config""#));
    }

    #[test]
    fn config_with_unknown_section_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        let mut file = std::fs::File::create(&path).expect("create config");
        file.write_all(br#"{ "scna": {} }"#).expect("write config");

        preflight()
            .arg("--config")
            .arg(&path)
            .args(["running", "winword"])
            .assert()
            .failure()
            .code(predicate::eq(11));
    }

    #[test]
    fn config_error_is_human_readable_in_summary_format() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope.json");
        preflight()
            .arg("--config")
            .arg(&missing)
            .args(["--format", "summary", "running", "winword"])
            .assert()
            .failure()
            .code(predicate::eq(11))
            .stderr(predicate::str::contains("Configuration Error"));
    }
}

// ============================================================================
// Platform Error Tests
// ============================================================================

#[cfg(not(windows))]
mod platform_errors {
    use super::*;

    #[test]
    fn live_commands_report_unsupported_platform() {
        preflight()
            .args(["running", "winword"])
            .assert()
            .failure()
            .code(predicate::eq(12))
            .stdout(predicate::str::contains(r#""category":"platform""#));
    }

    #[test]
    fn scan_reports_unsupported_platform() {
        preflight()
            .args(["scan", "C:\\Data"])
            .assert()
            .failure()
            .code(predicate::eq(12));
    }

    #[test]
    fn completions_work_without_a_probe() {
        // Completion generation must not depend on platform support.
        preflight().args(["completions", "zsh"]).assert().success();
    }
}
