//! Configuration loading and validation.
//!
//! One optional JSON file configures scan, tracker and close-apps defaults.
//! Resolution order: explicit `--config` path, then the `PREFLIGHT_CONFIG`
//! environment variable, then `<config-dir>/preflight/config.json`. A
//! missing file at the resolved default location simply yields defaults; an
//! explicitly named file that is missing or malformed is an error. CLI flags
//! override whatever the file provides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use pf_common::{Error, Result};

use crate::closeapps::CloseAppsConfig;
use crate::lockscan::ScanOptions;
use crate::track::TrackerConfig;

const CONFIG_DIR_NAME: &str = "preflight";
const CONFIG_FILE_NAME: &str = "config.json";
const CONFIG_ENV_VAR: &str = "PREFLIGHT_CONFIG";

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_close_grace_ms() -> u64 {
    5_000
}

fn default_countdown_seconds() -> u64 {
    60
}

/// Tracker timing section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackerSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_close_grace_ms")]
    pub close_grace_ms: u64,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        TrackerSettings {
            poll_interval_ms: default_poll_interval_ms(),
            close_grace_ms: default_close_grace_ms(),
        }
    }
}

impl TrackerSettings {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Config(
                "tracker.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            close_grace: Duration::from_millis(self.close_grace_ms),
        }
    }
}

/// Close-apps session section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloseAppsSettings {
    #[serde(default = "default_countdown_seconds")]
    pub countdown_seconds: u64,
    #[serde(default)]
    pub forced_countdown: bool,
    #[serde(default)]
    pub continue_on_process_closure: bool,
}

impl Default for CloseAppsSettings {
    fn default() -> Self {
        CloseAppsSettings {
            countdown_seconds: default_countdown_seconds(),
            forced_countdown: false,
            continue_on_process_closure: false,
        }
    }
}

impl CloseAppsSettings {
    pub fn to_close_config(&self) -> CloseAppsConfig {
        CloseAppsConfig {
            countdown: Duration::from_secs(self.countdown_seconds),
            forced_countdown: self.forced_countdown,
            continue_on_process_closure: self.continue_on_process_closure,
        }
    }
}

/// The whole config file. Every section is optional with defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FileConfig {
    pub scan: ScanOptions,
    pub tracker: TrackerSettings,
    pub closeapps: CloseAppsSettings,
}

impl FileConfig {
    pub fn validate(&self) -> Result<()> {
        self.scan.validate()?;
        self.tracker.validate()?;
        self.closeapps.to_close_config().validate()?;
        Ok(())
    }
}

/// Loaded configuration with provenance.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: FileConfig,
    /// File the config came from; `None` means built-in defaults.
    pub path: Option<PathBuf>,
}

/// Load configuration with the standard resolution order.
///
/// Resolution order (highest to lowest priority):
/// 1. Explicit `--config` path (must exist)
/// 2. `PREFLIGHT_CONFIG` environment variable (must exist if set)
/// 3. `<config-dir>/preflight/config.json` (optional)
/// 4. Built-in defaults
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        return read_file(path).map(|config| LoadedConfig {
            config,
            path: Some(path.to_path_buf()),
        });
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
        let path = PathBuf::from(env_path);
        return read_file(&path).map(|config| LoadedConfig {
            config,
            path: Some(path),
        });
    }

    if let Some(path) = default_config_path() {
        if path.exists() {
            return read_file(&path).map(|config| LoadedConfig {
                config,
                path: Some(path),
            });
        }
        debug!(path = %path.display(), "no config file, using defaults");
    }
    Ok(LoadedConfig {
        config: FileConfig::default(),
        path: None,
    })
}

/// Default location: `<platform config dir>/preflight/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

fn read_file(path: &Path) -> Result<FileConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| Error::Config(format!("cannot read {}: {err}", path.display())))?;
    let config: FileConfig = serde_json::from_str(&raw)
        .map_err(|err| Error::Config(format!("invalid config {}: {err}", path.display())))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    // Env-var tests must not interleave.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var(CONFIG_ENV_VAR);
        let loaded = load_config(None).unwrap();
        // Either no file was found or a developer machine has one; the
        // defaults path must produce a valid config regardless.
        loaded.config.validate().unwrap();
        assert_eq!(FileConfig::default().tracker.poll_interval_ms, 1_000);
        assert_eq!(FileConfig::default().closeapps.countdown_seconds, 60);
    }

    #[test]
    fn test_explicit_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"{
                "scan": { "recursive": true, "max_depth": 3 },
                "tracker": { "poll_interval_ms": 250 },
                "closeapps": { "countdown_seconds": 120, "continue_on_process_closure": true }
            }"#,
        );
        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.path.as_deref(), Some(path.as_path()));
        assert!(loaded.config.scan.recursive);
        assert_eq!(loaded.config.scan.max_depth, 3);
        assert_eq!(loaded.config.tracker.poll_interval_ms, 250);
        // Unset fields keep their defaults.
        assert_eq!(loaded.config.tracker.close_grace_ms, 5_000);
        assert!(loaded.config.closeapps.continue_on_process_closure);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, r#"{ "scna": {} }"#);
        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_semantic_validation_applies() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, r#"{ "scan": { "max_depth": -4 } }"#);
        assert!(load_config(Some(&path)).is_err());

        let path = write_config(&dir, r#"{ "tracker": { "poll_interval_ms": 0 } }"#);
        assert!(load_config(Some(&path)).is_err());

        let path = write_config(&dir, r#"{ "closeapps": { "countdown_seconds": 0 } }"#);
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_env_var_resolution() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, r#"{ "tracker": { "poll_interval_ms": 333 } }"#);
        std::env::set_var(CONFIG_ENV_VAR, &path);
        let loaded = load_config(None).unwrap();
        std::env::remove_var(CONFIG_ENV_VAR);
        assert_eq!(loaded.config.tracker.poll_interval_ms, 333);
        assert_eq!(loaded.path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_settings_convert_to_component_configs() {
        let tracker = TrackerSettings {
            poll_interval_ms: 100,
            close_grace_ms: 200,
        }
        .to_tracker_config();
        assert_eq!(tracker.poll_interval, Duration::from_millis(100));
        assert_eq!(tracker.close_grace, Duration::from_millis(200));

        let close = CloseAppsSettings {
            countdown_seconds: 30,
            forced_countdown: true,
            continue_on_process_closure: false,
        }
        .to_close_config();
        assert_eq!(close.countdown, Duration::from_secs(30));
        assert!(close.forced_countdown);
    }
}
