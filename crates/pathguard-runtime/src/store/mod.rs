//! Remote rule persistence.
//!
//! A [`PolicyStore`] is the enforcement point's view of the rules: the
//! engine pushes every confirmed change to it and pulls the full set on
//! refresh. Rules are keyed per agent.
//!
//! # Wire Format
//!
//! Both implementations speak the same JSON rule shape:
//!
//! ```json
//! {
//!   "agent_id": "host-01",
//!   "path": "C:/Users/bob",
//!   "can_read": true,  "can_write": false, "can_download": true,
//!   "can_execute": false, "can_search": true, "can_delete": false
//! }
//! ```
//!
//! | Implementation | Backend |
//! |----------------|---------|
//! | [`MemoryPolicyStore`] | In-process map with fault injection |
//! | [`HttpPolicyStore`] | Admin server over HTTP (`reqwest`) |

mod http;
mod memory;

pub use http::HttpPolicyStore;
pub use memory::{MemoryPolicyStore, StoreFault};

use crate::StoreError;
use async_trait::async_trait;
use pathguard_policy::{CanonicalPath, PermissionSet};
use pathguard_types::AgentId;
use serde::{Deserialize, Serialize};

/// Persistence backend for an agent's rules.
///
/// Implementations never retry; the caller decides what a failure means.
#[async_trait]
pub trait PolicyStore: Send + Sync + std::fmt::Debug {
    /// Stores (or replaces) the rule at `path`.
    async fn set_rule(
        &self,
        agent: &AgentId,
        path: &CanonicalPath,
        perms: PermissionSet,
    ) -> Result<(), StoreError>;

    /// Removes the rule at `path`. Removing an absent rule succeeds.
    async fn clear_rule(&self, agent: &AgentId, path: &CanonicalPath) -> Result<(), StoreError>;

    /// Every rule the store holds for `agent`.
    ///
    /// Paths are returned as the store holds them; callers normalize.
    async fn get_all_rules(&self, agent: &AgentId) -> Result<Vec<RuleRecord>, StoreError>;
}

/// One rule as exchanged with a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    pub path: String,
    #[serde(default)]
    pub can_read: bool,
    #[serde(default)]
    pub can_write: bool,
    #[serde(default)]
    pub can_download: bool,
    #[serde(default)]
    pub can_execute: bool,
    #[serde(default)]
    pub can_search: bool,
    #[serde(default)]
    pub can_delete: bool,
}

impl RuleRecord {
    /// Builds a record for `path`.
    #[must_use]
    pub fn new(agent: Option<&AgentId>, path: impl Into<String>, perms: PermissionSet) -> Self {
        Self {
            agent_id: agent.cloned(),
            path: path.into(),
            can_read: perms.read(),
            can_write: perms.write(),
            can_download: perms.download(),
            can_execute: perms.execute(),
            can_search: perms.search(),
            can_delete: perms.delete(),
        }
    }

    /// The six flags as a permission set.
    #[must_use]
    pub fn permissions(&self) -> PermissionSet {
        PermissionSet::new(
            self.can_read,
            self.can_write,
            self.can_download,
            self.can_execute,
            self.can_search,
            self.can_delete,
        )
    }
}
