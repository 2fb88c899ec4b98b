//! Configuration for trestle.
//!
//! ## config.kdl
//!
//! Located at:
//! - System: `~/.config/trestle/config.kdl` (or `$TRESTLE_CONFIG_DIR/config.kdl`)
//! - Session: `~/.local/share/trestle/<repo-hash>/config.kdl`
//!
//! Contains:
//! - `output-format` - "json" or "human"
//! - `max-cascade-depth` - ancestors re-saved per cascade (1-1024)
//! - `progress-mode` - default for new WBS nodes
//! - `action-log` - record CLI commands to `action.log`
//!
//! Use the [`resolver`] module for precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    CONFIG_DIR_ENV, ConfigOverrides, MAX_CASCADE_DEPTH_ENV, Resolved, ResolvedConfig, ValueSource,
    resolve_config, resolve_layers, session_config_path, system_config_path,
};
pub use schema::{CONFIG_KEYS, MAX_CASCADE_DEPTH_RANGE, OutputFormat, TrestleConfig};

/// File name used for both config layers.
pub const CONFIG_FILE_NAME: &str = "config.kdl";
