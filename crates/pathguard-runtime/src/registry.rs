//! One policy engine per agent.
//!
//! Engines are created on first use by a factory closure and shared as
//! `Arc<PolicyEngine>`. Engines for different agents never share a tree,
//! a gate or an audit log.

use crate::PolicyEngine;
use parking_lot::RwLock;
use pathguard_types::AgentId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

type EngineFactory = dyn Fn(&AgentId) -> PolicyEngine + Send + Sync;

/// Lazily populated map of agent id to engine.
///
/// # Example
///
/// ```
/// use pathguard_runtime::{MemoryPolicyStore, PolicyEngine, PolicyRegistry};
/// use pathguard_types::AgentId;
/// use std::sync::Arc;
///
/// let store = Arc::new(MemoryPolicyStore::new());
/// let registry = PolicyRegistry::new(move |agent| {
///     PolicyEngine::builder(agent.clone(), store.clone()).build()
/// });
///
/// let a = registry.engine(&AgentId::new("a"));
/// let again = registry.engine(&AgentId::new("a"));
/// assert!(Arc::ptr_eq(&a, &again));
/// ```
pub struct PolicyRegistry {
    engines: RwLock<HashMap<AgentId, Arc<PolicyEngine>>>,
    factory: Box<EngineFactory>,
}

impl fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field("agents", &self.agents())
            .finish_non_exhaustive()
    }
}

impl PolicyRegistry {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&AgentId) -> PolicyEngine + Send + Sync + 'static,
    {
        Self {
            engines: RwLock::new(HashMap::new()),
            factory: Box::new(factory),
        }
    }

    /// Engine for `agent`, created on first request.
    pub fn engine(&self, agent: &AgentId) -> Arc<PolicyEngine> {
        if let Some(engine) = self.engines.read().get(agent) {
            return Arc::clone(engine);
        }
        let mut engines = self.engines.write();
        Arc::clone(
            engines
                .entry(agent.clone())
                .or_insert_with(|| Arc::new((self.factory)(agent))),
        )
    }

    /// Engine for `agent` if one was already created.
    #[must_use]
    pub fn get(&self, agent: &AgentId) -> Option<Arc<PolicyEngine>> {
        self.engines.read().get(agent).cloned()
    }

    /// Drops the engine for `agent`. Holders of the `Arc` keep working.
    pub fn remove(&self, agent: &AgentId) -> Option<Arc<PolicyEngine>> {
        self.engines.write().remove(agent)
    }

    /// Known agent ids, sorted.
    #[must_use]
    pub fn agents(&self) -> Vec<AgentId> {
        let mut ids: Vec<AgentId> = self.engines.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}
