//! Configuration file support for Provender.
//!
//! Provender reads two configuration files:
//! - Global: `~/.provender/config.toml` - User-wide defaults
//! - Project: `.provender/config.toml` - Overrides next to the recipe
//!
//! Project config takes precedence over global config, and CLI flags take
//! precedence over both.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default number of retries for transient fetch failures.
pub const DEFAULT_RETRIES: u32 = 3;

/// Hosts that receive the bearer token unless configured otherwise.
pub const DEFAULT_TOKEN_HOSTS: &[&str] = &["api.github.com"];

/// Provender configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network settings
    pub net: NetConfig,

    /// Resolution settings
    pub resolve: ResolveConfig,
}

/// Network-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct NetConfig {
    /// Per-request timeout in seconds
    pub timeout: Option<u64>,

    /// Retries for timeouts, connection failures and 5xx responses
    pub retries: Option<u32>,

    /// User-Agent header sent with every request
    pub user_agent: Option<String>,

    /// Hosts that receive the bearer token (e.g. `api.github.com`)
    pub token_hosts: Vec<String>,
}

impl NetConfig {
    /// Effective request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Effective retry count.
    pub fn retries(&self) -> u32 {
        self.retries.unwrap_or(DEFAULT_RETRIES)
    }

    /// Effective token hosts.
    pub fn token_hosts(&self) -> Vec<String> {
        if self.token_hosts.is_empty() {
            DEFAULT_TOKEN_HOSTS.iter().map(|h| h.to_string()).collect()
        } else {
            self.token_hosts.clone()
        }
    }
}

/// Resolution-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ResolveConfig {
    /// Worker threads for parallel resolution (None = number of CPUs)
    pub jobs: Option<usize>,

    /// Re-fetch artifacts whose digest came from upstream metadata and compare
    pub verify: bool,

    /// Persistent workspace for import-graph checkouts (None = temp dir per run)
    pub workspace: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.net.timeout.is_some() {
            self.net.timeout = other.net.timeout;
        }
        if other.net.retries.is_some() {
            self.net.retries = other.net.retries;
        }
        if other.net.user_agent.is_some() {
            self.net.user_agent = other.net.user_agent;
        }
        if !other.net.token_hosts.is_empty() {
            self.net.token_hosts = other.net.token_hosts;
        }
        if other.resolve.jobs.is_some() {
            self.resolve.jobs = other.resolve.jobs;
        }
        if other.resolve.verify {
            self.resolve.verify = true;
        }
        if other.resolve.workspace.is_some() {
            self.resolve.workspace = other.resolve.workspace;
        }
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.provender/config.toml)
/// 2. Global config (~/.provender/config.toml)
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        config.merge(Config::load_or_default(global_path));
    }

    config.merge(Config::load_or_default(project_path));
    config
}

/// Get the global provender config directory (~/.provender).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".provender"))
}

/// Get the global config path (~/.provender/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.provender/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".provender").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.net.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.net.retries(), DEFAULT_RETRIES);
        assert_eq!(config.net.token_hosts(), vec!["api.github.com".to_string()]);
        assert!(!config.resolve.verify);
    }

    #[test]
    fn test_parse_kebab_case() {
        let config: Config = toml::from_str(
            r#"
[net]
timeout = 5
token-hosts = ["gitlab.gnome.org"]

[resolve]
jobs = 2
verify = true
"#,
        )
        .unwrap();

        assert_eq!(config.net.timeout(), Duration::from_secs(5));
        assert_eq!(config.net.token_hosts(), vec!["gitlab.gnome.org".to_string()]);
        assert_eq!(config.resolve.jobs, Some(2));
        assert!(config.resolve.verify);
    }

    #[test]
    fn test_project_overrides_global() {
        let tmp = TempDir::new().unwrap();
        let global = tmp.path().join("global.toml");
        let project = tmp.path().join("project.toml");
        std::fs::write(&global, "[net]\ntimeout = 10\nretries = 1\n").unwrap();
        std::fs::write(&project, "[net]\ntimeout = 30\n").unwrap();

        let config = load_config(Some(&global), &project);

        assert_eq!(config.net.timeout, Some(30));
        assert_eq!(config.net.retries, Some(1));
    }

    #[test]
    fn test_broken_config_falls_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[net\n").unwrap();

        assert_eq!(Config::load_or_default(&path), Config::default());
    }
}
