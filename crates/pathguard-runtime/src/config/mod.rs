//! Configuration management with hierarchical layering.
//!
//! # Architecture
//!
//! ```text
//! Priority (highest to lowest):
//!
//! ┌──────────────────────────────────────────────┐
//! │  1. CLI flags (applied by the binary)        │
//! ├──────────────────────────────────────────────┤
//! │  2. Environment Variables (PATHGUARD_*)      │
//! ├──────────────────────────────────────────────┤
//! │  3. Project Config (.pathguard/config.toml)  │
//! ├──────────────────────────────────────────────┤
//! │  4. Global Config (~/.pathguard/config.toml) │
//! ├──────────────────────────────────────────────┤
//! │  5. Default Values (compile-time)            │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Config Field | Type |
//! |----------|--------------|------|
//! | `PATHGUARD_AGENT_ID` | `agent.id` | String |
//! | `PATHGUARD_AGENT_URL` | `agent.url` | String |
//! | `PATHGUARD_ADMIN_URL` | `agent.admin_url` | String |
//! | `PATHGUARD_CASE_SENSITIVE` | `policy.case_sensitive` | bool |
//! | `PATHGUARD_UNKNOWN_OPERATION` | `policy.unknown_operation` | `allow` / `deny` |
//! | `PATHGUARD_SYNC_TIMEOUT_MS` | `sync.timeout_ms` | u64 |
//! | `PATHGUARD_CACHE_DIR` | `sync.cache_dir` | PathBuf |
//! | `PATHGUARD_AUDIT_CAPACITY` | `audit.capacity` | usize |
//!
//! # Example Configuration
//!
//! ```toml
//! # ~/.pathguard/config.toml
//!
//! [agent]
//! id = "host-01"
//! url = "http://10.0.0.5:9000"
//! admin_url = "http://localhost:8080"
//!
//! [policy]
//! case_sensitive = false
//! unknown_operation = "allow"
//!
//! [policy.root]
//! read = true
//! download = true
//! search = true
//!
//! [sync]
//! timeout_ms = 10000
//! cache_dir = "~/.pathguard/cache"
//!
//! [audit]
//! capacity = 1000
//! ```

mod error;
mod loader;
mod types;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use types::{AgentConfig, AuditConfig, GuardConfig, PolicyConfig, SyncConfig};

/// Default global config directory.
pub fn default_config_dir() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".pathguard")
}

/// Default global config file path.
pub fn default_config_path() -> std::path::PathBuf {
    default_config_dir().join("config.toml")
}

/// Project config directory name.
pub const PROJECT_CONFIG_DIR: &str = ".pathguard";

/// Project config file name.
pub const PROJECT_CONFIG_FILE: &str = "config.toml";
