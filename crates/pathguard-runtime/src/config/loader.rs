//! Configuration loader with hierarchical merging.
//!
//! # Load Order
//!
//! 1. Default values (compile-time)
//! 2. Global config (`~/.pathguard/config.toml`)
//! 3. Project config (`.pathguard/config.toml`)
//! 4. Environment variables (`PATHGUARD_*`)
//!
//! Each layer overrides the previous. CLI flags are applied by the binary
//! on top of the loaded result.

use super::{default_config_path, ConfigError, GuardConfig, PROJECT_CONFIG_DIR, PROJECT_CONFIG_FILE};
use pathguard_policy::UnknownOperationPolicy;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Helper macro for parsing boolean environment variables.
macro_rules! parse_env_bool {
    ($env:expr, $field:expr, $var:literal) => {
        if let Some(val) = $env($var) {
            $field = parse_bool(&val)
                .ok_or_else(|| ConfigError::invalid_env_var($var, "expected bool"))?;
        }
    };
}

/// Helper macro for parsing numeric environment variables.
macro_rules! parse_env_num {
    ($env:expr, $field:expr, $var:literal) => {
        if let Some(val) = $env($var) {
            $field = val
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid_env_var($var, "expected non-negative integer"))?;
        }
    };
}

/// Configuration loader with builder pattern.
///
/// # Example
///
/// ```no_run
/// use pathguard_runtime::config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_project_root("/path/to/project")
///     .skip_env_vars()
///     .load()?;
/// # Ok::<(), pathguard_runtime::config::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    /// Global config file path (defaults to ~/.pathguard/config.toml).
    global_config_path: Option<PathBuf>,

    /// Project root directory.
    project_root: Option<PathBuf>,

    skip_env: bool,
    skip_global: bool,
    skip_project: bool,
}

impl ConfigLoader {
    /// Creates a new loader with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a custom global config path.
    #[must_use]
    pub fn with_global_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_config_path = Some(path.into());
        self
    }

    /// Sets the project root directory.
    ///
    /// Project config will be loaded from `<project_root>/.pathguard/config.toml`.
    #[must_use]
    pub fn with_project_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_root = Some(path.into());
        self
    }

    /// Skips environment variable loading.
    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Skips global config loading.
    #[must_use]
    pub fn skip_global_config(mut self) -> Self {
        self.skip_global = true;
        self
    }

    /// Skips project config loading.
    #[must_use]
    pub fn skip_project_config(mut self) -> Self {
        self.skip_project = true;
        self
    }

    /// Loads and merges configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any config file exists but cannot be
    /// parsed, or an environment variable holds an invalid value. Missing
    /// config files are silently ignored.
    pub fn load(&self) -> Result<GuardConfig, ConfigError> {
        self.load_with_env(|name| std::env::var(name).ok())
    }

    /// [`load`](Self::load) with a custom environment lookup.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn load_with_env<F>(&self, env: F) -> Result<GuardConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = GuardConfig::default();

        // Layer 1: Global config
        if !self.skip_global {
            let global_path = self
                .global_config_path
                .clone()
                .unwrap_or_else(default_config_path);

            if let Some(global_config) = load_file(&global_path)? {
                debug!(path = %global_path.display(), "Loaded global config");
                config.merge(&global_config);
            }
        }

        // Layer 2: Project config
        if !self.skip_project {
            if let Some(ref project_root) = self.project_root {
                let project_config_path = project_root
                    .join(PROJECT_CONFIG_DIR)
                    .join(PROJECT_CONFIG_FILE);

                if let Some(project_config) = load_file(&project_config_path)? {
                    debug!(path = %project_config_path.display(), "Loaded project config");
                    config.merge(&project_config);
                }
            }
        }

        // Layer 3: Environment variables
        if !self.skip_env {
            apply_env_vars(&mut config, &env)?;
        }

        Ok(config)
    }
}

/// Loads a config file, returning None if it doesn't exist.
fn load_file(path: &Path) -> Result<Option<GuardConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    let config = GuardConfig::from_toml(&content).map_err(|e| ConfigError::parse_toml(path, e))?;
    Ok(Some(config))
}

/// Applies environment variable overrides.
fn apply_env_vars<F>(config: &mut GuardConfig, env: &F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = env("PATHGUARD_AGENT_ID") {
        config.agent.id = val;
    }
    if let Some(val) = env("PATHGUARD_AGENT_URL") {
        config.agent.url = Some(val);
    }
    if let Some(val) = env("PATHGUARD_ADMIN_URL") {
        config.agent.admin_url = Some(val);
    }

    parse_env_bool!(env, config.policy.case_sensitive, "PATHGUARD_CASE_SENSITIVE");

    if let Some(val) = env("PATHGUARD_UNKNOWN_OPERATION") {
        config.policy.unknown_operation = match val.trim().to_lowercase().as_str() {
            "allow" => UnknownOperationPolicy::Allow,
            "deny" => UnknownOperationPolicy::Deny,
            _ => {
                return Err(ConfigError::invalid_env_var(
                    "PATHGUARD_UNKNOWN_OPERATION",
                    "expected 'allow' or 'deny'",
                ))
            }
        };
    }

    parse_env_num!(env, config.sync.timeout_ms, "PATHGUARD_SYNC_TIMEOUT_MS");
    parse_env_num!(env, config.audit.capacity, "PATHGUARD_AUDIT_CAPACITY");

    if let Some(val) = env("PATHGUARD_CACHE_DIR") {
        config.sync.cache_dir = Some(PathBuf::from(val));
    }

    Ok(())
}

/// Parses a boolean from string.
///
/// Accepts: "true", "false", "1", "0", "yes", "no", "on", "off" (case-insensitive).
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("config.toml");
        std::fs::write(&path, content).expect("write config");
        path
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn load_defaults_only() {
        let config = ConfigLoader::new()
            .skip_global_config()
            .skip_project_config()
            .skip_env_vars()
            .load()
            .expect("load defaults");

        assert_eq!(config, GuardConfig::default());
    }

    #[test]
    fn load_project_overrides_global() {
        let global_temp = TempDir::new().expect("tempdir");
        let project_temp = TempDir::new().expect("tempdir");
        let project_dir = project_temp.path().join(".pathguard");
        std::fs::create_dir_all(&project_dir).expect("mkdir");

        let global_path = create_config_file(
            global_temp.path(),
            r#"
[agent]
id = "global-agent"

[sync]
timeout_ms = 3000
"#,
        );
        create_config_file(
            &project_dir,
            r#"
[agent]
id = "project-agent"
"#,
        );

        let config = ConfigLoader::new()
            .with_global_config(&global_path)
            .with_project_root(project_temp.path())
            .skip_env_vars()
            .load()
            .expect("load layered");

        assert_eq!(config.agent.id, "project-agent");
        assert_eq!(config.sync.timeout_ms, 3000);
    }

    #[test]
    fn missing_config_files_ok() {
        let config = ConfigLoader::new()
            .with_global_config("/nonexistent/path/config.toml")
            .with_project_root("/nonexistent/project")
            .skip_env_vars()
            .load()
            .expect("missing files are ignored");

        assert_eq!(config, GuardConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let temp = TempDir::new().expect("tempdir");
        let path = create_config_file(temp.path(), "[sync\ntimeout_ms = ");
        let err = ConfigLoader::new()
            .with_global_config(&path)
            .skip_env_vars()
            .load()
            .expect_err("malformed");
        assert!(matches!(err, ConfigError::ParseToml { .. }));
    }

    #[test]
    fn env_overrides_files() {
        let config = ConfigLoader::new()
            .skip_global_config()
            .skip_project_config()
            .load_with_env(env_of(&[
                ("PATHGUARD_AGENT_ID", "env-agent"),
                ("PATHGUARD_CASE_SENSITIVE", "off"),
                ("PATHGUARD_UNKNOWN_OPERATION", "DENY"),
                ("PATHGUARD_SYNC_TIMEOUT_MS", "750"),
                ("PATHGUARD_CACHE_DIR", "/tmp/pg-cache"),
            ]))
            .expect("env layer");

        assert_eq!(config.agent.id, "env-agent");
        assert!(!config.policy.case_sensitive);
        assert_eq!(config.policy.unknown_operation, UnknownOperationPolicy::Deny);
        assert_eq!(config.sync.timeout_ms, 750);
        assert_eq!(config.sync.cache_dir, Some(PathBuf::from("/tmp/pg-cache")));
    }

    #[test]
    fn invalid_env_values() {
        let loader = ConfigLoader::new().skip_global_config().skip_project_config();

        let err = loader
            .load_with_env(env_of(&[("PATHGUARD_CASE_SENSITIVE", "maybe")]))
            .expect_err("bad bool");
        assert!(err.to_string().contains("PATHGUARD_CASE_SENSITIVE"));

        let err = loader
            .load_with_env(env_of(&[("PATHGUARD_AUDIT_CAPACITY", "-1")]))
            .expect_err("bad number");
        assert!(err.to_string().contains("PATHGUARD_AUDIT_CAPACITY"));

        let err = loader
            .load_with_env(env_of(&[("PATHGUARD_UNKNOWN_OPERATION", "maybe")]))
            .expect_err("bad policy");
        assert!(matches!(err, ConfigError::InvalidEnvVar { .. }));
    }

    #[test]
    fn parse_bool_values() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("invalid"), None);
    }
}
