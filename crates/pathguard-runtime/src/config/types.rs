//! Configuration types.
//!
//! All types implement [`Default`] for compile-time fallback values.

use crate::audit::DEFAULT_AUDIT_CAPACITY;
use crate::cache::SnapshotCache;
use crate::engine::EngineBuilder;
use crate::{AuditLog, PolicyEngine, PolicyStore};
use pathguard_policy::{PathNormalizer, PermissionSet, UnknownOperationPolicy};
use pathguard_types::AgentId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Main configuration structure, after merging all layers.
///
/// # Example
///
/// ```
/// use pathguard_runtime::config::GuardConfig;
///
/// let config = GuardConfig::default();
/// assert!(config.policy.case_sensitive);
/// assert_eq!(config.sync.timeout_ms, 10_000);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GuardConfig {
    pub agent: AgentConfig,
    pub policy: PolicyConfig,
    pub sync: SyncConfig,
    pub audit: AuditConfig,
}

impl GuardConfig {
    /// Deserializes from TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Merges another config into this one.
    ///
    /// Values from `other` override values in `self` only if they differ
    /// from the default.
    pub fn merge(&mut self, other: &Self) {
        self.agent.merge(&other.agent);
        self.policy.merge(&other.policy);
        self.sync.merge(&other.sync);
        self.audit.merge(&other.audit);
    }

    /// Engine builder for the configured agent with every policy, sync and
    /// audit setting applied.
    #[must_use]
    pub fn engine_builder(&self, store: Arc<dyn PolicyStore>) -> EngineBuilder {
        let mut builder = PolicyEngine::builder(AgentId::new(&self.agent.id), store)
            .normalizer(PathNormalizer::new(self.policy.case_sensitive))
            .unknown_operation(self.policy.unknown_operation)
            .root_default(self.policy.root)
            .sync_timeout(self.sync.timeout())
            .audit(AuditLog::new(self.audit.capacity));
        if let Some(dir) = &self.sync.cache_dir {
            builder = builder.cache(SnapshotCache::new(dir));
        }
        builder
    }
}

/// Which agent to talk to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent id rules are keyed by.
    pub id: String,

    /// Base URL of the agent's file API (listings).
    pub url: Option<String>,

    /// Base URL of the admin server holding the policy registry. Without
    /// it, rules live in process memory only.
    pub admin_url: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            id: "local".into(),
            url: None,
            admin_url: None,
        }
    }
}

impl AgentConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.id != default.id {
            self.id = other.id.clone();
        }
        if other.url.is_some() {
            self.url = other.url.clone();
        }
        if other.admin_url.is_some() {
            self.admin_url = other.admin_url.clone();
        }
    }
}

/// Policy evaluation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PolicyConfig {
    /// Keep path case when canonicalizing.
    pub case_sensitive: bool,

    /// Decision for operations without a capability flag.
    pub unknown_operation: UnknownOperationPolicy,

    /// Root (`/`) rule used until the store supplies one.
    pub root: PermissionSet,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            unknown_operation: UnknownOperationPolicy::Allow,
            root: PermissionSet::console_default(),
        }
    }
}

impl PolicyConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.case_sensitive != default.case_sensitive {
            self.case_sensitive = other.case_sensitive;
        }
        if other.unknown_operation != default.unknown_operation {
            self.unknown_operation = other.unknown_operation;
        }
        if other.root != default.root {
            self.root = other.root;
        }
    }
}

/// Remote sync settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Bound on a single push, retract or pull, in milliseconds.
    pub timeout_ms: u64,

    /// Directory for per-agent policy snapshots. No cache when unset.
    pub cache_dir: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            cache_dir: None,
        }
    }
}

impl SyncConfig {
    fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.timeout_ms != default.timeout_ms {
            self.timeout_ms = other.timeout_ms;
        }
        if other.cache_dir.is_some() {
            self.cache_dir = other.cache_dir.clone();
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Audit log settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuditConfig {
    /// Entries retained before the oldest is evicted.
    pub capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_AUDIT_CAPACITY,
        }
    }
}

impl AuditConfig {
    fn merge(&mut self, other: &Self) {
        if other.capacity != Self::default().capacity {
            self.capacity = other.capacity;
        }
    }
}
