//! Exit codes for the preflight CLI.
//!
//! Exit codes communicate operation outcome without requiring output parsing.
//!
//! Exit code ranges:
//! - 0-9: Operational outcomes (parse outcome from code, not output)
//! - 10-19: User/environment errors (recoverable by user action)
//! - 20-29: Runtime/internal errors

use crate::closeapps::CloseAppsOutcome;
use pf_common::Error;

/// Exit codes for preflight operations.
///
/// These codes are a stable contract for deployment automation. Changes
/// require a major version bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Operational Outcomes (0-9)
    // ========================================================================
    /// Success: command completed; a close-apps session ended in Continue
    /// or Close.
    Success = 0,

    /// Liveness query found no matching process.
    NotRunning = 1,

    /// The user (or host) deferred the close-apps session.
    Deferred = 2,

    /// The countdown elapsed without a decision.
    CountdownElapsed = 3,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments or option values
    UsageError = 10,

    /// Config file missing, unreadable, or invalid
    ConfigError = 11,

    /// Live probing is not available on this platform
    PlatformError = 12,

    /// Access denied by the operating system
    AccessDenied = 13,

    // ========================================================================
    // Runtime / Internal Errors (20-29)
    // ========================================================================
    /// System probe failure (enumeration, handle table, vanished process)
    ProbeError = 20,

    /// Internal error (bug - please report)
    InternalError = 21,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code indicates an operational outcome (codes 0-9).
    /// These are not errors - they communicate session state.
    pub fn is_operational(self) -> bool {
        (self as i32) < 10
    }

    /// Check if this exit code is a user/environment error (codes 10-19).
    /// These can be resolved by user action.
    pub fn is_user_error(self) -> bool {
        let code = self as i32;
        (10..20).contains(&code)
    }

    /// Check if this exit code is a runtime/internal error (codes 20-29).
    pub fn is_internal_error(self) -> bool {
        let code = self as i32;
        code >= 20
    }

    /// Check if this exit code indicates any error requiring attention.
    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Get the code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Success => "OK",
            ExitCode::NotRunning => "OK_NOT_RUNNING",
            ExitCode::Deferred => "OK_DEFERRED",
            ExitCode::CountdownElapsed => "ERR_COUNTDOWN",
            ExitCode::UsageError => "ERR_USAGE",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::PlatformError => "ERR_PLATFORM",
            ExitCode::AccessDenied => "ERR_ACCESS",
            ExitCode::ProbeError => "ERR_PROBE",
            ExitCode::InternalError => "ERR_INTERNAL",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::Config(_) => ExitCode::ConfigError,
            Error::InvalidScanOptions(_) | Error::InvalidCountdown(_) => ExitCode::UsageError,

            Error::Enumeration(_)
            | Error::HandleTable(_)
            | Error::ProcessNotFound { .. }
            | Error::WorkerSpawn(_) => ExitCode::ProbeError,

            Error::AccessDenied { .. } => ExitCode::AccessDenied,

            Error::UnsupportedPlatform(_) => ExitCode::PlatformError,

            Error::Cancelled | Error::Io(_) | Error::Json(_) => ExitCode::InternalError,
        }
    }
}

impl From<CloseAppsOutcome> for ExitCode {
    fn from(outcome: CloseAppsOutcome) -> Self {
        match outcome {
            CloseAppsOutcome::Continue | CloseAppsOutcome::Close => ExitCode::Success,
            CloseAppsOutcome::Timeout => ExitCode::CountdownElapsed,
            // A cancelled session ended without resolution, same as a defer.
            CloseAppsOutcome::Defer | CloseAppsOutcome::Cancelled => ExitCode::Deferred,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_ranges() {
        assert!(ExitCode::Success.is_operational());
        assert!(ExitCode::CountdownElapsed.is_operational());
        assert!(!ExitCode::CountdownElapsed.is_error());
        assert!(ExitCode::UsageError.is_user_error());
        assert!(ExitCode::AccessDenied.is_user_error());
        assert!(ExitCode::ProbeError.is_internal_error());
        assert!(ExitCode::ProbeError.is_error());
    }

    #[test]
    fn test_exit_code_values_are_stable() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::NotRunning.as_i32(), 1);
        assert_eq!(ExitCode::Deferred.as_i32(), 2);
        assert_eq!(ExitCode::CountdownElapsed.as_i32(), 3);
        assert_eq!(ExitCode::UsageError.as_i32(), 10);
        assert_eq!(ExitCode::ConfigError.as_i32(), 11);
        assert_eq!(ExitCode::PlatformError.as_i32(), 12);
        assert_eq!(ExitCode::AccessDenied.as_i32(), 13);
        assert_eq!(ExitCode::ProbeError.as_i32(), 20);
        assert_eq!(ExitCode::InternalError.as_i32(), 21);
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            ExitCode::from(&Error::InvalidScanOptions("depth".into())),
            ExitCode::UsageError
        );
        assert_eq!(
            ExitCode::from(&Error::AccessDenied { context: "x".into() }),
            ExitCode::AccessDenied
        );
        assert_eq!(
            ExitCode::from(&Error::HandleTable("short read".into())),
            ExitCode::ProbeError
        );
        assert_eq!(
            ExitCode::from(&Error::UnsupportedPlatform("linux".into())),
            ExitCode::PlatformError
        );
    }

    #[test]
    fn test_outcome_mapping() {
        assert_eq!(ExitCode::from(CloseAppsOutcome::Continue), ExitCode::Success);
        assert_eq!(ExitCode::from(CloseAppsOutcome::Close), ExitCode::Success);
        assert_eq!(ExitCode::from(CloseAppsOutcome::Defer), ExitCode::Deferred);
        assert_eq!(
            ExitCode::from(CloseAppsOutcome::Timeout),
            ExitCode::CountdownElapsed
        );
    }

    #[test]
    fn test_display_shows_name_and_code() {
        assert_eq!(ExitCode::Deferred.to_string(), "OK_DEFERRED (2)");
        assert_eq!(ExitCode::ProbeError.to_string(), "ERR_PROBE (20)");
    }
}
