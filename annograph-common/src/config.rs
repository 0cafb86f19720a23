//! Configuration loading and resolution
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`ANNOGRAPH_CONFIG`)
//! 3. User config directory (`~/.config/annograph/config.toml` on Linux)
//! 4. Built-in defaults (fallback)
//!
//! A missing config file is never fatal: defaults are used and a warning is logged.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "ANNOGRAPH_CONFIG";

/// Import configuration loaded from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Maximum `precedes` hops for onset/coda and degenerate window searches
    #[serde(default = "default_search_hop_limit")]
    pub search_hop_limit: usize,

    /// Partitions processed concurrently
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Mutations handed to the sink per commit
    #[serde(default = "default_commit_batch_size")]
    pub commit_batch_size: usize,

    /// Run the invariant checker on every partition after its last stage
    #[serde(default = "default_check_invariants")]
    pub check_invariants: bool,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            search_hop_limit: default_search_hop_limit(),
            max_workers: default_max_workers(),
            commit_batch_size: default_commit_batch_size(),
            check_invariants: default_check_invariants(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_search_hop_limit() -> usize {
    10
}

fn default_max_workers() -> usize {
    4
}

fn default_commit_batch_size() -> usize {
    2000
}

fn default_check_invariants() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ImportConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Reject settings that would make every search or flush a no-op
    pub fn validate(&self) -> Result<()> {
        if self.search_hop_limit == 0 {
            return Err(Error::Config("search_hop_limit must be at least 1".to_string()));
        }
        if self.max_workers == 0 {
            return Err(Error::Config("max_workers must be at least 1".to_string()));
        }
        if self.commit_batch_size == 0 {
            return Err(Error::Config("commit_batch_size must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Write this configuration as TOML
    pub fn write(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Locate the config file following the priority order above.
///
/// Returns `None` when no candidate exists on disk.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: User config directory
    dirs::config_dir()
        .map(|d| d.join("annograph").join("config.toml"))
        .filter(|p| p.exists())
}

/// Resolve and load configuration, falling back to defaults.
///
/// An explicitly named file (CLI or environment) that fails to load is an
/// error; an absent default-location file is not.
pub fn load_config(cli_arg: Option<&Path>) -> Result<ImportConfig> {
    let explicit = cli_arg.is_some() || std::env::var(CONFIG_ENV_VAR).is_ok();

    match resolve_config_path(cli_arg) {
        Some(path) if path.exists() => {
            let config = ImportConfig::load(&path)?;
            info!("Configuration loaded from {}", path.display());
            Ok(config)
        }
        Some(path) if explicit => Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        ))),
        _ => {
            warn!("No configuration file found, using built-in defaults");
            Ok(ImportConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_periodic_commit_and_hop_bound() {
        let config = ImportConfig::default();
        assert_eq!(config.search_hop_limit, 10);
        assert_eq!(config.commit_batch_size, 2000);
        assert_eq!(config.max_workers, 4);
        assert!(config.check_invariants);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = ImportConfig::from_toml_str("max_workers = 2\n").unwrap();
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.search_hop_limit, 10);
    }

    #[test]
    fn test_zero_hop_limit_rejected() {
        let err = ImportConfig::from_toml_str("search_hop_limit = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_cli_path_takes_priority() {
        let path = PathBuf::from("/tmp/explicit.toml");
        assert_eq!(resolve_config_path(Some(&path)), Some(path));
    }
}
