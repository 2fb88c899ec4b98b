//! KDL schema for config.kdl.
//!
//! ```kdl
//! output-format "human"
//! max-cascade-depth 16
//! progress-mode "manual"
//! action-log #false
//! ```

use std::path::Path;

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};

use crate::models::ProgressMode;
use crate::{Error, Result};

/// Bounds accepted for `max-cascade-depth`.
pub const MAX_CASCADE_DEPTH_RANGE: std::ops::RangeInclusive<usize> = 1..=1024;

/// Keys recognised in config.kdl, in display order.
pub const CONFIG_KEYS: &[&str] = &[
    "output-format",
    "max-cascade-depth",
    "progress-mode",
    "action-log",
];

/// Output format preference for CLI commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON output (default, machine-readable)
    #[default]
    Json,
    /// Human-readable output
    Human,
}

impl OutputFormat {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "human" => Some(OutputFormat::Human),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Human => "human",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Preferences stored in config.kdl. Unset keys fall through to the next layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrestleConfig {
    /// Default output format for CLI commands
    pub output_format: Option<OutputFormat>,

    /// Maximum number of ancestors re-saved by one cascade
    pub max_cascade_depth: Option<usize>,

    /// Progress mode given to newly created WBS nodes
    pub progress_mode: Option<ProgressMode>,

    /// Whether CLI commands are appended to the action log
    pub action_log: Option<bool>,
}

impl TrestleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config values.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(depth) = self.max_cascade_depth {
            if !MAX_CASCADE_DEPTH_RANGE.contains(&depth) {
                return Err(format!(
                    "max-cascade-depth must be {}-{}, got {}",
                    MAX_CASCADE_DEPTH_RANGE.start(),
                    MAX_CASCADE_DEPTH_RANGE.end(),
                    depth
                ));
            }
        }
        Ok(())
    }

    /// Parse config from a KDL document. Values of the wrong type are ignored.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        let mut config = Self::new();

        if let Some(value) = first_value(doc, "output-format") {
            config.output_format = value.as_string().and_then(OutputFormat::parse);
        }

        if let Some(value) = first_value(doc, "max-cascade-depth") {
            if let Some(i) = value.as_integer() {
                if let Ok(depth) = usize::try_from(i) {
                    config.max_cascade_depth = Some(depth);
                }
            }
        }

        if let Some(value) = first_value(doc, "progress-mode") {
            config.progress_mode = value.as_string().and_then(ProgressMode::parse);
        }

        if let Some(value) = first_value(doc, "action-log") {
            config.action_log = value.as_bool();
        }

        config
    }

    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        if let Some(format) = self.output_format {
            push_node(
                &mut doc,
                "output-format",
                KdlValue::String(format.as_str().to_string()),
            );
        }
        if let Some(depth) = self.max_cascade_depth {
            push_node(&mut doc, "max-cascade-depth", KdlValue::Integer(depth as i128));
        }
        if let Some(mode) = self.progress_mode {
            push_node(
                &mut doc,
                "progress-mode",
                KdlValue::String(mode.as_str().to_string()),
            );
        }
        if let Some(enabled) = self.action_log {
            push_node(&mut doc, "action-log", KdlValue::Bool(enabled));
        }

        doc
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` if they are Some.
    pub fn merge(&mut self, other: &TrestleConfig) {
        if other.output_format.is_some() {
            self.output_format = other.output_format;
        }
        if other.max_cascade_depth.is_some() {
            self.max_cascade_depth = other.max_cascade_depth;
        }
        if other.progress_mode.is_some() {
            self.progress_mode = other.progress_mode;
        }
        if other.action_log.is_some() {
            self.action_log = other.action_log;
        }
    }

    /// Current value of `key` as a display string, if set.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(match key {
            "output-format" => self.output_format.map(|f| f.as_str().to_string()),
            "max-cascade-depth" => self.max_cascade_depth.map(|d| d.to_string()),
            "progress-mode" => self.progress_mode.map(|m| m.as_str().to_string()),
            "action-log" => self.action_log.map(|b| b.to_string()),
            _ => return Err(unknown_key(key)),
        })
    }

    /// Set `key` from its string form, validating the result.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "output-format" => {
                self.output_format = Some(OutputFormat::parse(value).ok_or_else(|| {
                    Error::Config(format!("output-format must be json or human, got {}", value))
                })?);
            }
            "max-cascade-depth" => {
                let depth = value.parse::<usize>().map_err(|_| {
                    Error::Config(format!("max-cascade-depth must be a number, got {}", value))
                })?;
                self.max_cascade_depth = Some(depth);
            }
            "progress-mode" => {
                self.progress_mode = Some(ProgressMode::parse(value).ok_or_else(|| {
                    Error::Config(format!(
                        "progress-mode must be manual or derived-from-tasks, got {}",
                        value
                    ))
                })?);
            }
            "action-log" => {
                self.action_log = Some(parse_bool(value).ok_or_else(|| {
                    Error::Config(format!("action-log must be true or false, got {}", value))
                })?);
            }
            _ => return Err(unknown_key(key)),
        }
        self.validate().map_err(Error::Config)
    }

    /// Load config from a KDL file. A missing file is an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = std::fs::read_to_string(path)?;
        let doc: KdlDocument = content.parse().map_err(|e| {
            Error::Config(format!("Failed to parse KDL in {}: {}", path.display(), e))
        })?;

        let config = Self::from_kdl(&doc);
        config
            .validate()
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Write config to a KDL file, creating parent directories.
    pub fn store(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, self.to_kdl().to_string())?;
        Ok(())
    }
}

fn first_value<'a>(doc: &'a KdlDocument, name: &str) -> Option<&'a KdlValue> {
    doc.get(name)
        .and_then(|node| node.entries().first())
        .map(|entry| entry.value())
}

fn push_node(doc: &mut KdlDocument, name: &str, value: KdlValue) {
    let mut node = KdlNode::new(name);
    node.push(KdlEntry::new(value));
    doc.nodes_mut().push(node);
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn unknown_key(key: &str) -> Error {
    Error::Config(format!(
        "Unknown config key: {} (expected one of: {})",
        key,
        CONFIG_KEYS.join(", ")
    ))
}
