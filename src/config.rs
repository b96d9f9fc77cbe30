//! Wand configuration module.
//!
//! Handles loading, validating, and merging `wand.toml`. Stock defaults are
//! serialized to a TOML table and the user file is merged over it, so a file
//! only needs the keys it wants to change.
//!
//! ## Config File Location
//!
//! `wand.toml` in the working directory, or any file passed with `--config`.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [defaults]
//! background = "#fff"           # -background before the first option
//! bordercolor = "#dfdfdf"       # -bordercolor
//! mattecolor = "#bdbdbd"        # -mattecolor
//! respect_parenthesis = false   # -respect-parenthesis
//!
//! [resources]
//! memory = "unlimited"          # SI size ("256MiB") or "unlimited"
//! map = "unlimited"
//! disk = "unlimited"
//! threads = 0                   # 0 = all cores
//!
//! [log]
//! level = "warn"                # used when RUST_LOG is not set
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::color::parse_color;
use crate::keywords::ResourceType;
use crate::resource::{Limit, ResourceRegistry};
use crate::wand::{Wand, WandError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// File name looked up in a directory by [`load_config`].
pub const CONFIG_FILE: &str = "wand.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `wand.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WandConfig {
    /// Settings applied to a fresh wand before any option.
    pub defaults: DefaultsConfig,
    /// Initial resource limits and the worker pool size.
    pub resources: ResourcesConfig,
    pub log: LogConfig,
}

impl WandConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("defaults.background", &self.defaults.background),
            ("defaults.bordercolor", &self.defaults.bordercolor),
            ("defaults.mattecolor", &self.defaults.mattecolor),
        ] {
            if parse_color(value).is_err() {
                return Err(ConfigError::Validation(format!(
                    "{key}: unrecognized color `{value}`"
                )));
            }
        }
        for (kind, value) in self.resources.limits() {
            if Limit::parse(value).is_none() {
                return Err(ConfigError::Validation(format!(
                    "resources.{}: expected a size or \"unlimited\", got `{value}`",
                    kind.as_str().to_ascii_lowercase()
                )));
            }
        }
        if !LOG_LEVELS.contains(&self.log.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "log.level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }

    /// Apply the defaults and resource limits to a wand.
    ///
    /// Settings go through the normal setting entry point, so a bad value
    /// ends up in the wand's exception sink like any other option.
    pub fn apply(&self, wand: &mut Wand) -> Result<(), WandError> {
        let d = &self.defaults;
        wand.apply_setting("-background", Some(&d.background))?;
        wand.apply_setting("-bordercolor", Some(&d.bordercolor))?;
        wand.apply_setting("-mattecolor", Some(&d.mattecolor))?;
        if d.respect_parenthesis {
            wand.apply_setting("-respect-parenthesis", None)?;
        }
        self.resources.install(wand.resources.as_ref());
        Ok(())
    }
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefaultsConfig {
    pub background: String,
    pub bordercolor: String,
    pub mattecolor: String,
    /// Make `(` and `)` also scope settings.
    pub respect_parenthesis: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            background: "#fff".to_string(),
            bordercolor: "#dfdfdf".to_string(),
            mattecolor: "#bdbdbd".to_string(),
            respect_parenthesis: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourcesConfig {
    pub memory: String,
    pub map: String,
    pub disk: String,
    /// Worker threads for pixel work. `0` uses every core.
    pub threads: usize,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            memory: "unlimited".to_string(),
            map: "unlimited".to_string(),
            disk: "unlimited".to_string(),
            threads: 0,
        }
    }
}

impl ResourcesConfig {
    fn limits(&self) -> [(ResourceType, &String); 3] {
        [
            (ResourceType::Memory, &self.memory),
            (ResourceType::Map, &self.map),
            (ResourceType::Disk, &self.disk),
        ]
    }

    /// Push the configured limits into a registry. Values were checked by
    /// [`WandConfig::validate`]; anything unparseable is skipped.
    pub fn install(&self, registry: &dyn ResourceRegistry) {
        for (kind, value) in self.limits() {
            if let Some(limit) = Limit::parse(value) {
                registry.set_limit(kind, limit);
            }
        }
    }
}

/// Resolve the effective thread count from config.
///
/// - `0` → use all available cores
/// - `n` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ResourcesConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    match config.threads {
        0 => cores,
        n => n.min(cores),
    }
}

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(WandConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(file: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !file.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(file)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<WandConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: WandConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load `wand.toml` from the given directory.
pub fn load_config(dir: &Path) -> Result<WandConfig, ConfigError> {
    load_config_file(&dir.join(CONFIG_FILE))
}

/// Load a specific config file; a missing file yields the stock defaults.
pub fn load_config_file(file: &Path) -> Result<WandConfig, ConfigError> {
    let overlay = load_raw_config(file)?;
    resolve_config(stock_defaults_value(), overlay)
}

/// Returns a fully-commented stock `wand.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Wand Configuration
# ==================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Settings applied before the first command-line option
# ---------------------------------------------------------------------------
[defaults]
# Background color for reads of empty canvases, -extent, -rotate, ...
background = "#fff"

# Color of -border.
bordercolor = "#dfdfdf"

# Color of -frame.
mattecolor = "#bdbdbd"

# When true, ( and ) also save and restore settings, as { and } do.
respect_parenthesis = false

# ---------------------------------------------------------------------------
# Resource limits
# ---------------------------------------------------------------------------
[resources]
# Either "unlimited" or a size with an optional SI/IEC prefix
# ("512MB", "2GiB"). The same values can be changed per run with -limit.
memory = "unlimited"
map = "unlimited"
disk = "unlimited"

# Worker threads for pixel operations. 0 uses every core; larger values are
# clamped to the core count.
threads = 0

# ---------------------------------------------------------------------------
# Logging
# ---------------------------------------------------------------------------
[log]
# One of error, warn, info, debug, trace. RUST_LOG takes precedence.
level = "warn"
"##
}
