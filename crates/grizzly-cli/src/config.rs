//! Configuration loading – reads `~/.grizzly/motion_safety.toml`.
//!
//! The file is optional and may be partial: any field left out keeps its
//! default.  `GRIZZLY_*` environment variables override the file, and the
//! result is validated before the node is built.

use std::fs;
use std::path::{Path, PathBuf};

use grizzly_kernel::MotionSafetyConfig;
use grizzly_types::MotionError;
use tracing::warn;

/// Return the config file path: `$GRIZZLY_CONFIG` when set, otherwise
/// `~/.grizzly/motion_safety.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("GRIZZLY_CONFIG") {
        return PathBuf::from(path);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
/// Extracted for testability without mutating environment variables.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".grizzly").join("motion_safety.toml")
}

/// Load the effective configuration: file (if any), then environment
/// overrides, then validation.
///
/// # Errors
///
/// Returns [`MotionError::Config`] if the file exists but cannot be read or
/// parsed, and [`MotionError::InvalidConfig`] if the result fails validation.
pub fn load() -> Result<MotionSafetyConfig, MotionError> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(cfg)
}

/// Load the config from a specific path.  Returns `None` if the file does not
/// exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<MotionSafetyConfig>, MotionError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        MotionError::Config(format!("Failed to read config at {}: {}", path.display(), e))
    })?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| MotionError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
    Ok(Some(cfg))
}

/// Apply `GRIZZLY_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `GRIZZLY_ENCODERS_TIMEOUT` | `encoders_timeout` |
/// | `GRIZZLY_MAX_ACCELERATION` | `max_acceleration` |
/// | `GRIZZLY_WHEEL_RADIUS` | `wheel_radius` |
/// | `GRIZZLY_STARTING_DURATION` | `starting_duration` |
/// | `GRIZZLY_WATCHDOG_PERIOD` | `watchdog_period` |
///
/// Values that do not parse as numbers are ignored with a warning.
pub fn apply_env_overrides(cfg: &mut MotionSafetyConfig) {
    let overrides: [(&str, &mut f64); 5] = [
        ("GRIZZLY_ENCODERS_TIMEOUT", &mut cfg.encoders_timeout),
        ("GRIZZLY_MAX_ACCELERATION", &mut cfg.max_acceleration),
        ("GRIZZLY_WHEEL_RADIUS", &mut cfg.wheel_radius),
        ("GRIZZLY_STARTING_DURATION", &mut cfg.starting_duration),
        ("GRIZZLY_WATCHDOG_PERIOD", &mut cfg.watchdog_period),
    ];
    for (var, field) in overrides {
        if let Ok(v) = std::env::var(var) {
            match v.trim().parse::<f64>() {
                Ok(value) => *field = value,
                Err(e) => warn!(var, value = %v, error = %e, "ignoring unparseable override"),
            }
        }
    }
}

/// Render `cfg` as TOML, suitable for writing back to [`config_path`].
///
/// # Errors
///
/// Returns [`MotionError::Config`] if serialisation fails.
pub fn render(cfg: &MotionSafetyConfig) -> Result<String, MotionError> {
    toml::to_string_pretty(cfg)
        .map_err(|e| MotionError::Config(format!("Failed to serialize config: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_points_to_grizzly_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".grizzly"));
        assert!(p.to_string_lossy().ends_with("motion_safety.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        let result = load_from(&path).expect("no error");
        assert!(result.is_none());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("motion_safety.toml");
        fs::write(&path, "max_acceleration = 0.5\nstarting_duration = 3.0\n").expect("write");

        let cfg = load_from(&path).expect("load ok").expect("some");
        assert_eq!(cfg.max_acceleration, 0.5);
        assert_eq!(cfg.starting_duration, 3.0);
        assert_eq!(cfg.wheel_radius, MotionSafetyConfig::default().wheel_radius);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("motion_safety.toml");
        fs::write(&path, "wheel_radius = \"big\"\n").expect("write");

        assert!(matches!(load_from(&path), Err(MotionError::Config(_))));
    }

    #[test]
    fn rendered_config_loads_back() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("motion_safety.toml");
        let cfg = MotionSafetyConfig {
            encoder_fault_time_to_failure: 0.75,
            ..MotionSafetyConfig::default()
        };
        fs::write(&path, render(&cfg).expect("render")).expect("write");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, cfg);
    }

    /// All override cases share one test: `apply_env_overrides` reads every
    /// `GRIZZLY_*` variable, so separate tests would race on the environment.
    #[test]
    fn apply_env_overrides_reads_grizzly_vars() {
        // SAFETY: the only test in this crate that touches GRIZZLY_* variables.
        unsafe {
            std::env::set_var("GRIZZLY_MAX_ACCELERATION", "2.5");
            std::env::set_var("GRIZZLY_STARTING_DURATION", " 4.0 ");
            std::env::set_var("GRIZZLY_WATCHDOG_PERIOD", "fast");
        }
        let mut cfg = MotionSafetyConfig::default();
        let original_period = cfg.watchdog_period;
        apply_env_overrides(&mut cfg);
        unsafe {
            std::env::remove_var("GRIZZLY_MAX_ACCELERATION");
            std::env::remove_var("GRIZZLY_STARTING_DURATION");
            std::env::remove_var("GRIZZLY_WATCHDOG_PERIOD");
        }

        assert_eq!(cfg.max_acceleration, 2.5);
        assert_eq!(cfg.starting_duration, 4.0);
        assert_eq!(cfg.watchdog_period, original_period, "unparseable value is ignored");
        assert_eq!(cfg.wheel_radius, MotionSafetyConfig::default().wheel_radius);
    }
}
