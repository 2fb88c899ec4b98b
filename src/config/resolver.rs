//! Precedence resolution for configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. Environment variables (`TRESTLE_MAX_CASCADE_DEPTH`)
//! 3. Session config.kdl (`<data-dir>/<repo-hash>/config.kdl`)
//! 4. System config.kdl (`~/.config/trestle/config.kdl`)
//! 5. Built-in defaults

use std::path::{Path, PathBuf};

use crate::config::{CONFIG_FILE_NAME, OutputFormat, TrestleConfig};
use crate::engine::{DEFAULT_MAX_CASCADE_DEPTH, EngineSettings};
use crate::models::ProgressMode;
use crate::{Error, Result};

/// Environment variable overriding the cascade bound.
pub const MAX_CASCADE_DEPTH_ENV: &str = "TRESTLE_MAX_CASCADE_DEPTH";

/// Environment variable overriding the system config directory.
pub const CONFIG_DIR_ENV: &str = "TRESTLE_CONFIG_DIR";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from environment variable
    EnvVar(String),
    /// Value from session-level config
    Session,
    /// Value from system-level config
    System,
    /// Value from CLI flag
    CliFlag,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::Session => write!(f, "session"),
            ValueSource::System => write!(f, "system"),
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Fully resolved configuration with source tracking.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub output_format: Resolved<OutputFormat>,
    pub max_cascade_depth: Resolved<usize>,
    pub progress_mode: Resolved<ProgressMode>,
    pub action_log: Resolved<bool>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            output_format: Resolved::new(OutputFormat::Json, ValueSource::Default),
            max_cascade_depth: Resolved::new(DEFAULT_MAX_CASCADE_DEPTH, ValueSource::Default),
            progress_mode: Resolved::new(ProgressMode::default(), ValueSource::Default),
            action_log: Resolved::new(true, ValueSource::Default),
        }
    }
}

impl ResolvedConfig {
    pub fn output_format(&self) -> OutputFormat {
        self.output_format.value
    }

    pub fn max_cascade_depth(&self) -> usize {
        self.max_cascade_depth.value
    }

    pub fn progress_mode(&self) -> ProgressMode {
        self.progress_mode.value
    }

    pub fn action_log(&self) -> bool {
        self.action_log.value
    }

    /// Engine tunables derived from this config.
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            max_cascade_depth: self.max_cascade_depth(),
        }
    }

    /// `(key, value, source)` rows in display order.
    pub fn entries(&self) -> Vec<(&'static str, String, &ValueSource)> {
        vec![
            (
                "output-format",
                self.output_format.value.as_str().to_string(),
                &self.output_format.source,
            ),
            (
                "max-cascade-depth",
                self.max_cascade_depth.value.to_string(),
                &self.max_cascade_depth.source,
            ),
            (
                "progress-mode",
                self.progress_mode.value.as_str().to_string(),
                &self.progress_mode.source,
            ),
            (
                "action-log",
                self.action_log.value.to_string(),
                &self.action_log.source,
            ),
        ]
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub output_format: Option<OutputFormat>,
    pub max_cascade_depth: Option<usize>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn with_max_cascade_depth(mut self, depth: usize) -> Self {
        self.max_cascade_depth = Some(depth);
        self
    }
}

/// Directory holding the system config.kdl.
pub fn system_config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    dirs::config_dir()
        .map(|d| d.join("trestle"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
}

pub fn system_config_path() -> Result<PathBuf> {
    Ok(system_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Session config.kdl inside a repository's storage directory.
pub fn session_config_path(storage_root: &Path) -> PathBuf {
    storage_root.join(CONFIG_FILE_NAME)
}

fn env_cascade_depth() -> Result<Option<usize>> {
    match std::env::var(MAX_CASCADE_DEPTH_ENV) {
        Ok(raw) => {
            let mut candidate = TrestleConfig::new();
            candidate
                .set("max-cascade-depth", raw.trim())
                .map_err(|e| Error::Config(format!("{}: {}", MAX_CASCADE_DEPTH_ENV, e)))?;
            Ok(candidate.max_cascade_depth)
        }
        Err(_) => Ok(None),
    }
}

/// Resolve configuration with the full precedence chain.
///
/// `storage_root` is the repository's storage directory; pass `None` before
/// `wbs system init` has run to skip the session layer.
pub fn resolve_config(
    storage_root: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<ResolvedConfig> {
    let system = TrestleConfig::load(&system_config_path()?)?;
    let session = match storage_root {
        Some(root) => TrestleConfig::load(&session_config_path(root))?,
        None => TrestleConfig::new(),
    };
    resolve_layers(&session, &system, overrides, env_cascade_depth()?)
}

/// Resolve already-loaded layers. Split out so precedence can be tested without files.
pub fn resolve_layers(
    session: &TrestleConfig,
    system: &TrestleConfig,
    overrides: &ConfigOverrides,
    env_depth: Option<usize>,
) -> Result<ResolvedConfig> {
    let mut result = ResolvedConfig::default();

    if let Some(format) = overrides.output_format {
        result.output_format = Resolved::new(format, ValueSource::CliFlag);
    } else if let Some(format) = session.output_format {
        result.output_format = Resolved::new(format, ValueSource::Session);
    } else if let Some(format) = system.output_format {
        result.output_format = Resolved::new(format, ValueSource::System);
    }

    if let Some(depth) = overrides.max_cascade_depth {
        let check = TrestleConfig {
            max_cascade_depth: Some(depth),
            ..Default::default()
        };
        check.validate().map_err(Error::Config)?;
        result.max_cascade_depth = Resolved::new(depth, ValueSource::CliFlag);
    } else if let Some(depth) = env_depth {
        result.max_cascade_depth =
            Resolved::new(depth, ValueSource::EnvVar(MAX_CASCADE_DEPTH_ENV.to_string()));
    } else if let Some(depth) = session.max_cascade_depth {
        result.max_cascade_depth = Resolved::new(depth, ValueSource::Session);
    } else if let Some(depth) = system.max_cascade_depth {
        result.max_cascade_depth = Resolved::new(depth, ValueSource::System);
    }

    if let Some(mode) = session.progress_mode {
        result.progress_mode = Resolved::new(mode, ValueSource::Session);
    } else if let Some(mode) = system.progress_mode {
        result.progress_mode = Resolved::new(mode, ValueSource::System);
    }

    if let Some(enabled) = session.action_log {
        result.action_log = Resolved::new(enabled, ValueSource::Session);
    } else if let Some(enabled) = system.action_log {
        result.action_log = Resolved::new(enabled, ValueSource::System);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_value_source_display() {
        assert_eq!(
            format!("{}", ValueSource::EnvVar("FOO".to_string())),
            "env:FOO"
        );
        assert_eq!(format!("{}", ValueSource::Session), "session");
        assert_eq!(format!("{}", ValueSource::System), "system");
        assert_eq!(format!("{}", ValueSource::CliFlag), "cli");
        assert_eq!(format!("{}", ValueSource::Default), "default");
    }

    #[test]
    fn test_resolve_layers_defaults() {
        let empty = TrestleConfig::new();
        let config = resolve_layers(&empty, &empty, &ConfigOverrides::new(), None).unwrap();

        assert_eq!(config.output_format(), OutputFormat::Json);
        assert_eq!(config.output_format.source, ValueSource::Default);
        assert_eq!(config.max_cascade_depth(), 32);
        assert_eq!(config.progress_mode(), ProgressMode::DerivedFromTasks);
        assert!(config.action_log());
    }

    #[test]
    fn test_session_overrides_system() {
        let session = TrestleConfig {
            max_cascade_depth: Some(8),
            ..Default::default()
        };
        let system = TrestleConfig {
            max_cascade_depth: Some(4),
            output_format: Some(OutputFormat::Human),
            ..Default::default()
        };
        let config = resolve_layers(&session, &system, &ConfigOverrides::new(), None).unwrap();

        assert_eq!(config.max_cascade_depth(), 8);
        assert_eq!(config.max_cascade_depth.source, ValueSource::Session);
        assert_eq!(config.output_format(), OutputFormat::Human);
        assert_eq!(config.output_format.source, ValueSource::System);
    }

    #[test]
    fn test_env_between_cli_and_session() {
        let session = TrestleConfig {
            max_cascade_depth: Some(8),
            ..Default::default()
        };
        let empty = TrestleConfig::new();

        let config = resolve_layers(&session, &empty, &ConfigOverrides::new(), Some(3)).unwrap();
        assert_eq!(config.max_cascade_depth(), 3);
        assert_eq!(
            config.max_cascade_depth.source,
            ValueSource::EnvVar(MAX_CASCADE_DEPTH_ENV.to_string())
        );

        let overrides = ConfigOverrides::new().with_max_cascade_depth(2);
        let config = resolve_layers(&session, &empty, &overrides, Some(3)).unwrap();
        assert_eq!(config.max_cascade_depth(), 2);
        assert_eq!(config.max_cascade_depth.source, ValueSource::CliFlag);
    }

    #[test]
    fn test_cli_depth_is_validated() {
        let empty = TrestleConfig::new();
        let overrides = ConfigOverrides::new().with_max_cascade_depth(0);
        assert!(matches!(
            resolve_layers(&empty, &empty, &overrides, None),
            Err(Error::Config(_))
        ));
    }

    #[test]
    #[serial]
    fn test_resolve_config_reads_files_and_env() {
        let system_dir = TempDir::new().unwrap();
        let session_dir = TempDir::new().unwrap();

        // SAFETY: serialised with the other env-mutating tests
        unsafe {
            std::env::set_var(CONFIG_DIR_ENV, system_dir.path());
            std::env::remove_var(MAX_CASCADE_DEPTH_ENV);
        }

        TrestleConfig {
            progress_mode: Some(ProgressMode::Manual),
            action_log: Some(false),
            ..Default::default()
        }
        .store(&system_config_path().unwrap())
        .unwrap();
        TrestleConfig {
            action_log: Some(true),
            ..Default::default()
        }
        .store(&session_config_path(session_dir.path()))
        .unwrap();

        let config = resolve_config(Some(session_dir.path()), &ConfigOverrides::new()).unwrap();
        assert_eq!(config.progress_mode(), ProgressMode::Manual);
        assert_eq!(config.progress_mode.source, ValueSource::System);
        assert!(config.action_log());
        assert_eq!(config.action_log.source, ValueSource::Session);

        unsafe { std::env::set_var(MAX_CASCADE_DEPTH_ENV, "5") };
        let config = resolve_config(Some(session_dir.path()), &ConfigOverrides::new()).unwrap();
        assert_eq!(config.max_cascade_depth(), 5);

        unsafe { std::env::set_var(MAX_CASCADE_DEPTH_ENV, "lots") };
        assert!(resolve_config(None, &ConfigOverrides::new()).is_err());

        unsafe {
            std::env::remove_var(MAX_CASCADE_DEPTH_ENV);
            std::env::remove_var(CONFIG_DIR_ENV);
        }
    }
}
