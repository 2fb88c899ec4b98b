//! `wbs config` commands.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::{Output, to_json_string};
use crate::Result;
use crate::config::{
    CONFIG_KEYS, ConfigOverrides, TrestleConfig, resolve_config, session_config_path,
    system_config_path,
};
use crate::storage::Storage;
use crate::Error;

fn session_root(repo_path: &Path) -> Result<Option<PathBuf>> {
    if Storage::exists(repo_path)? {
        Ok(Some(Storage::open(repo_path)?.root().to_path_buf()))
    } else {
        Ok(None)
    }
}

#[derive(Serialize)]
pub struct ConfigValue {
    pub key: String,
    pub value: String,
    pub source: String,
}

impl Output for ConfigValue {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        format!("{} = {} ({})", self.key, self.value, self.source)
    }
}

#[derive(Serialize)]
pub struct ConfigList {
    pub entries: Vec<ConfigValue>,
}

impl Output for ConfigList {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        self.entries
            .iter()
            .map(ConfigValue::to_human)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn config_list(repo_path: &Path, overrides: &ConfigOverrides) -> Result<ConfigList> {
    let root = session_root(repo_path)?;
    let resolved = resolve_config(root.as_deref(), overrides)?;
    let entries = resolved
        .entries()
        .into_iter()
        .map(|(key, value, source)| ConfigValue {
            key: key.to_string(),
            value,
            source: source.to_string(),
        })
        .collect();
    Ok(ConfigList { entries })
}

pub fn config_get(repo_path: &Path, overrides: &ConfigOverrides, key: &str) -> Result<ConfigValue> {
    if !CONFIG_KEYS.contains(&key) {
        // Reuse the schema's unknown-key message
        TrestleConfig::new().get(key)?;
    }
    config_list(repo_path, overrides)?
        .entries
        .into_iter()
        .find(|e| e.key == key)
        .ok_or_else(|| Error::Config(format!("Unknown config key: {}", key)))
}

#[derive(Serialize)]
pub struct ConfigSetResult {
    pub key: String,
    pub value: String,
    pub path: String,
}

impl Output for ConfigSetResult {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        format!("Set {} = {} in {}", self.key, self.value, self.path)
    }
}

/// Write `key` to the session config, or the system config with `system`.
pub fn config_set(repo_path: &Path, key: &str, value: &str, system: bool) -> Result<ConfigSetResult> {
    let path = if system {
        system_config_path()?
    } else {
        let root = session_root(repo_path)?.ok_or(Error::NotInitialized)?;
        session_config_path(&root)
    };

    let mut config = TrestleConfig::load(&path)?;
    config.set(key, value)?;
    config.store(&path)?;

    let stored = config.get(key)?.unwrap_or_else(|| value.to_string());
    tracing::info!(key, value = %stored, path = %path.display(), "updated config");
    Ok(ConfigSetResult {
        key: key.to_string(),
        value: stored,
        path: path.display().to_string(),
    })
}
