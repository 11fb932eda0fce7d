//! Global context for Provender operations.
//!
//! Provides centralized access to configuration, paths, and credentials.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::sources::http::{HttpOptions, RetryPolicy};
use crate::util::config::{global_config_path, load_config, project_config_path, Config};

/// Name of the recipe file looked up from the working directory upwards.
pub const RECIPE_FILE: &str = "provender.toml";

/// Environment variable holding the bearer token for API hosts.
pub const TOKEN_ENV: &str = "PROVENDER_TOKEN";

/// Fallback token variable, commonly present in CI.
pub const FALLBACK_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Global context for a Provender invocation.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Merged configuration
    config: Config,

    /// Bearer token for known API hosts
    token: Option<String>,
}

impl GlobalContext {
    /// Create a new global context from the process environment.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir()?;
        Self::with_cwd(cwd)
    }

    /// Create a context rooted at a specific directory.
    pub fn with_cwd(cwd: PathBuf) -> Result<Self> {
        let global = global_config_path();
        let config = load_config(global.as_deref(), &project_config_path(&cwd));

        let token = std::env::var(TOKEN_ENV)
            .or_else(|_| std::env::var(FALLBACK_TOKEN_ENV))
            .ok()
            .filter(|t| !t.trim().is_empty());

        Ok(GlobalContext { cwd, config, token })
    }

    /// Replace the configuration (used by tests and `--config`).
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Get the merged configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether a bearer token is available.
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Find the recipe by walking up from the working directory.
    pub fn find_recipe(&self) -> Result<PathBuf> {
        find_recipe(&self.cwd)
    }

    /// HTTP client options derived from configuration and credentials.
    pub fn http_options(&self) -> HttpOptions {
        let net = &self.config.net;
        HttpOptions {
            timeout: net.timeout(),
            retry: RetryPolicy {
                retries: net.retries(),
                ..RetryPolicy::default()
            },
            user_agent: net
                .user_agent
                .clone()
                .unwrap_or_else(|| HttpOptions::default().user_agent),
            token: self.token.clone(),
            token_hosts: net.token_hosts(),
        }
    }
}

/// Find `provender.toml` in `start` or any of its ancestors.
pub fn find_recipe(start: &Path) -> Result<PathBuf> {
    for dir in start.ancestors() {
        let candidate = dir.join(RECIPE_FILE);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    bail!(
        "could not find `{}` in `{}` or any parent directory",
        RECIPE_FILE,
        start.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_recipe_in_parent() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(RECIPE_FILE), "[app]\napp-id = \"x\"\n").unwrap();
        let nested = tmp.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let found = find_recipe(&nested).unwrap();
        assert_eq!(found, tmp.path().join(RECIPE_FILE));
    }

    #[test]
    fn test_find_recipe_missing() {
        let tmp = TempDir::new().unwrap();
        let err = find_recipe(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("could not find `provender.toml`"));
    }

    #[test]
    fn test_http_options_follow_config() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.net.retries = Some(7);
        config.net.user_agent = Some("custom/1.0".to_string());

        let ctx = GlobalContext::with_cwd(tmp.path().to_path_buf())
            .unwrap()
            .with_config(config);
        let opts = ctx.http_options();

        assert_eq!(opts.retry.retries, 7);
        assert_eq!(opts.user_agent, "custom/1.0");
        assert_eq!(opts.token_hosts, vec!["api.github.com".to_string()]);
    }
}
