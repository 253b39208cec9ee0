//! In-memory policy store.

use super::{PolicyStore, RuleRecord};
use crate::StoreError;
use async_trait::async_trait;
use parking_lot::Mutex;
use pathguard_policy::{CanonicalPath, PermissionSet};
use pathguard_types::AgentId;
use std::collections::{BTreeMap, HashMap};

const ENDPOINT: &str = "memory://";

/// Failure mode injected into a [`MemoryPolicyStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFault {
    /// Every call fails with [`StoreError::Unreachable`].
    Unreachable,
    /// Every call fails with [`StoreError::Rejected`] (status 403).
    Reject,
    /// Every call waits forever; pair with a sync timeout.
    Hang,
}

/// Process-local store, keyed by agent then by path.
///
/// Used in tests and for running the CLI without an admin server. A fault
/// can be injected at any time to simulate an unreachable or hostile remote.
///
/// # Example
///
/// ```
/// use pathguard_policy::{normalize, PermissionSet};
/// use pathguard_runtime::{MemoryPolicyStore, PolicyStore, StoreFault};
/// use pathguard_types::AgentId;
///
/// # async fn example() -> Result<(), pathguard_runtime::StoreError> {
/// let store = MemoryPolicyStore::new();
/// let agent = AgentId::new("a");
/// store.set_rule(&agent, &normalize("/x"), PermissionSet::blocked()).await?;
/// assert_eq!(store.rule_count(&agent), 1);
///
/// store.inject(Some(StoreFault::Unreachable));
/// assert!(store.get_all_rules(&agent).await.is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryPolicyStore {
    rules: Mutex<HashMap<AgentId, BTreeMap<String, PermissionSet>>>,
    fault: Mutex<Option<StoreFault>>,
}

impl MemoryPolicyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets (or clears, with `None`) the injected fault.
    pub fn inject(&self, fault: Option<StoreFault>) {
        *self.fault.lock() = fault;
    }

    /// Stored rule at `path` for `agent`, bypassing any fault.
    #[must_use]
    pub fn stored(&self, agent: &AgentId, path: &str) -> Option<PermissionSet> {
        self.rules
            .lock()
            .get(agent)
            .and_then(|rules| rules.get(path).copied())
    }

    /// Number of rules stored for `agent`, bypassing any fault.
    #[must_use]
    pub fn rule_count(&self, agent: &AgentId) -> usize {
        self.rules.lock().get(agent).map_or(0, BTreeMap::len)
    }

    async fn gate(&self) -> Result<(), StoreError> {
        let fault = *self.fault.lock();
        match fault {
            None => Ok(()),
            Some(StoreFault::Unreachable) => {
                Err(StoreError::unreachable(ENDPOINT, "injected transport failure"))
            }
            Some(StoreFault::Reject) => Err(StoreError::rejected(403, "injected rejection")),
            Some(StoreFault::Hang) => std::future::pending().await,
        }
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn set_rule(
        &self,
        agent: &AgentId,
        path: &CanonicalPath,
        perms: PermissionSet,
    ) -> Result<(), StoreError> {
        self.gate().await?;
        self.rules
            .lock()
            .entry(agent.clone())
            .or_default()
            .insert(path.to_string(), perms);
        Ok(())
    }

    async fn clear_rule(&self, agent: &AgentId, path: &CanonicalPath) -> Result<(), StoreError> {
        self.gate().await?;
        if let Some(rules) = self.rules.lock().get_mut(agent) {
            rules.remove(path.as_str());
        }
        Ok(())
    }

    async fn get_all_rules(&self, agent: &AgentId) -> Result<Vec<RuleRecord>, StoreError> {
        self.gate().await?;
        let rules = self.rules.lock();
        Ok(rules
            .get(agent)
            .map(|rules| {
                rules
                    .iter()
                    .map(|(path, perms)| RuleRecord::new(Some(agent), path.clone(), *perms))
                    .collect()
            })
            .unwrap_or_default())
    }
}
