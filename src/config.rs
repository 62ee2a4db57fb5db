//! Tool configuration: logging and trace presentation.
//!
//! Precedence is environment > first config file found > defaults. Nothing
//! here changes what a run does to the database; that comes from argv alone.

use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "dbrepair.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Directory for rolling log files; logs go to stderr when unset.
    pub log_dir: Option<PathBuf>,
    /// error|warn|info|debug|trace
    pub log_level: Option<String>,
    /// Rolled log files to keep.
    pub log_retention: Option<u32>,
    /// Value printed as `tag=` on SQL trace lines.
    pub trace_tag: Option<i64>,
}

impl AppConfig {
    #[must_use]
    pub fn trace_tag(&self) -> i64 {
        self.trace_tag.unwrap_or(0)
    }

    /// Fill unset fields from `other`.
    fn or(mut self, other: AppConfig) -> Self {
        self.log_dir = self.log_dir.or(other.log_dir);
        self.log_level = self.log_level.or(other.log_level);
        self.log_retention = self.log_retention.or(other.log_retention);
        self.trace_tag = self.trace_tag.or(other.trace_tag);
        self
    }
}

/// Candidate config files, most specific first.
#[must_use]
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(p) = std::env::var("DBREPAIR_CONFIG") {
        paths.push(PathBuf::from(p));
    }
    if let Some(dir) = dirs_next::config_dir() {
        paths.push(dir.join(CONFIG_FILE_NAME));
    }
    if let Ok(cur) = std::env::current_dir() {
        paths.push(cur.join(CONFIG_FILE_NAME));
    }
    paths
}

/// Parse one config file.
///
/// # Errors
/// Returns a message if the file cannot be read or is not valid TOML for [`AppConfig`].
pub fn read_config_file(path: &Path) -> Result<AppConfig, String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    toml::from_str(&text).map_err(|e| format!("{}: {e}", path.display()))
}

/// Values from `DBREPAIR_*` environment variables, as read by `lookup`.
pub fn config_from_env(lookup: impl Fn(&str) -> Option<String>) -> AppConfig {
    AppConfig {
        log_dir: lookup("DBREPAIR_LOG_DIR").map(PathBuf::from),
        log_level: lookup("DBREPAIR_LOG_LEVEL"),
        log_retention: lookup("DBREPAIR_LOG_RETENTION").and_then(|s| s.trim().parse().ok()),
        trace_tag: lookup("DBREPAIR_TRACE_TAG").and_then(|s| s.trim().parse().ok()),
    }
}

/// Load the effective configuration for this process.
#[must_use]
pub fn load_config() -> AppConfig {
    let env = config_from_env(|k| std::env::var(k).ok());
    let file = config_paths()
        .into_iter()
        .filter(|p| p.is_file())
        .find_map(|p| match read_config_file(&p) {
            Ok(cfg) => Some(cfg),
            Err(e) => {
                warn!(target: "dbrepair::config", "ignoring config file {e}");
                None
            }
        })
        .unwrap_or_default();
    env.or(file)
}
