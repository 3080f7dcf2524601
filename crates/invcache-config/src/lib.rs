//! # invcache-config
//!
//! Configuration management for the inventory cache.
//!
//! Loads configuration from:
//! 1. `~/.invcache/config.toml` (global)
//! 2. `.invcache/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)

pub mod location;
pub mod logging;
pub mod testing;

pub use location::{cache_file_name, resolve_location, CacheLocation};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Explicit cache file path, wins over directory probing
pub const ENV_CACHE_FILE: &str = "INVCACHE_FILE";
/// Preferred artifacts directory
pub const ENV_ARTIFACTS: &str = "ARTIFACTS";
/// Workspace root; `$WORKSPACE/artifacts` then `$WORKSPACE` are probed
pub const ENV_WORKSPACE: &str = "WORKSPACE";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Could not find a writeable directory to use among: {candidates:?}")]
    NoWritableDirectory { candidates: Vec<PathBuf> },
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub location: LocationConfig,
    pub log: LogConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let project_path = Path::new(".invcache/config.toml");
        let mut config = Self::load_from(Self::global_config_path().as_deref(), Some(project_path))?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load and layer the given files; missing files are skipped
    pub fn load_from(global: Option<&Path>, project: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(global_path) = global.filter(|p| p.exists()) {
            debug!("Loading global config from {:?}", global_path);
            let contents = std::fs::read_to_string(global_path)?;
            config = toml::from_str(&contents)?;
        }

        if let Some(project_path) = project.filter(|p| p.exists()) {
            debug!("Loading project config from {:?}", project_path);
            let contents = std::fs::read_to_string(project_path)?;
            let project_config: Config = toml::from_str(&contents)?;
            config.merge(project_config);
        }

        Ok(config)
    }

    /// Global config path: ~/.invcache/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".invcache/config.toml"))
    }

    /// Merge another config (project overrides)
    fn merge(&mut self, other: Config) {
        if other.location.cache_file.is_some() {
            self.location.cache_file = other.location.cache_file;
        }
        if other.location.artifacts.is_some() {
            self.location.artifacts = other.location.artifacts;
        }
        if other.location.workspace.is_some() {
            self.location.workspace = other.location.workspace;
        }
        if other.log.level != LogConfig::default().level {
            self.log.level = other.log.level;
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Blank values are treated as unset.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };
        if let Some(path) = non_blank(ENV_CACHE_FILE) {
            self.location.cache_file = Some(path);
        }
        if let Some(path) = non_blank(ENV_ARTIFACTS) {
            self.location.artifacts = Some(path);
        }
        if let Some(path) = non_blank(ENV_WORKSPACE) {
            self.location.workspace = Some(path);
        }
    }
}

/// Where the backing file lives
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Use exactly this file, skipping directory probing
    pub cache_file: Option<PathBuf>,
    /// Artifacts directory, probed first
    pub artifacts: Option<PathBuf>,
    /// Workspace directory
    pub workspace: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter when neither INVCACHE_LOG nor RUST_LOG is set
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}
