//! Policy enforcement façade.
//!
//! # Reads and Writes
//!
//! ```text
//! check ───────────► SharedTree::load ──► Arc<PolicyTree> (never waits)
//!
//! apply_rule ─┐
//! reset_rule ─┼──► gate (async mutex) ──► stage ──► push ──┬─► publish staged
//! refresh ────┘                                            └─► drop staged
//! ```
//!
//! Mutations are serialized by a single async gate held across the remote
//! call; checks read the current `Arc` snapshot and are never blocked by it.
//! The staged tree stays private to the mutation until the store confirms
//! it, so checks never see an unconfirmed rule. Dropping an `apply_rule`
//! future mid-push leaves the published tree untouched.
//!
//! # Rule-change lifecycle
//!
//! ```text
//! Pending ──► LocalApplied ──┬──► RemoteConfirmed ──► (published)
//!                            └──► RemoteFailed ──► (rolled back)
//! ```

use crate::audit::{AuditLog, Severity};
use crate::cache::{PolicySnapshot, SnapshotCache};
use crate::sync::{PolicySync, SharedTree, SyncMode, SyncStatus};
use crate::{GuardError, PolicyStore};
use pathguard_policy::{
    CanonicalPath, Decision, OperationKind, PathNormalizer, PermissionSet, PolicyTree,
    UnknownOperationPolicy,
};
use pathguard_types::{AgentId, ChangeId};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Stage of a single rule change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeState {
    Pending,
    LocalApplied,
    RemoteConfirmed,
    RemoteFailed,
}

impl fmt::Display for ChangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::LocalApplied => "local_applied",
            Self::RemoteConfirmed => "remote_confirmed",
            Self::RemoteFailed => "remote_failed",
        };
        f.write_str(s)
    }
}

/// How a path's effective permissions were determined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The canonical form of the queried path.
    pub path: CanonicalPath,
    /// The path whose explicit rule applies (the path itself or an ancestor).
    pub source: CanonicalPath,
    pub permissions: PermissionSet,
}

impl Resolution {
    /// Returns `true` when the rule is inherited from an ancestor.
    #[must_use]
    pub fn is_inherited(&self) -> bool {
        self.path != self.source
    }
}

/// Builder for [`PolicyEngine`].
#[derive(Debug)]
pub struct EngineBuilder {
    agent: AgentId,
    store: Arc<dyn PolicyStore>,
    normalizer: PathNormalizer,
    unknown_operation: UnknownOperationPolicy,
    root_default: PermissionSet,
    sync_timeout: Duration,
    audit: Option<AuditLog>,
    cache: Option<SnapshotCache>,
}

impl EngineBuilder {
    #[must_use]
    pub fn normalizer(mut self, normalizer: PathNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    #[must_use]
    pub fn unknown_operation(mut self, policy: UnknownOperationPolicy) -> Self {
        self.unknown_operation = policy;
        self
    }

    /// Root rule used until a pull or cached snapshot supplies one.
    #[must_use]
    pub fn root_default(mut self, perms: PermissionSet) -> Self {
        self.root_default = perms;
        self
    }

    #[must_use]
    pub fn sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    /// Uses an existing audit log (e.g. one shared with a caller).
    #[must_use]
    pub fn audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: SnapshotCache) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn build(self) -> PolicyEngine {
        let tree = SharedTree::new(PolicyTree::new(self.root_default));
        let sync = PolicySync::new(
            self.agent.clone(),
            self.store,
            tree.clone(),
            self.normalizer,
            self.root_default,
        )
        .with_timeout(self.sync_timeout);

        PolicyEngine {
            agent: self.agent,
            normalizer: self.normalizer,
            unknown_operation: self.unknown_operation,
            root_default: self.root_default,
            tree,
            sync,
            audit: self.audit.unwrap_or_default(),
            cache: self.cache,
            gate: Mutex::new(()),
        }
    }
}

/// Enforcement façade for one agent's policy.
///
/// # Example
///
/// ```
/// use pathguard_policy::{Decision, OperationKind, PermissionSet};
/// use pathguard_runtime::{MemoryPolicyStore, PolicyEngine};
/// use pathguard_types::AgentId;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), pathguard_runtime::GuardError> {
/// let engine = PolicyEngine::builder(AgentId::new("host-01"), Arc::new(MemoryPolicyStore::new()))
///     .build();
///
/// engine.apply_rule("/secure", PermissionSet::blocked()).await?;
/// assert_eq!(engine.check("/secure/nested/file", &OperationKind::Read), Decision::Deny);
/// assert_eq!(engine.check("/public", &OperationKind::Read), Decision::Allow);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PolicyEngine {
    agent: AgentId,
    normalizer: PathNormalizer,
    unknown_operation: UnknownOperationPolicy,
    root_default: PermissionSet,
    tree: SharedTree,
    sync: PolicySync,
    audit: AuditLog,
    cache: Option<SnapshotCache>,
    gate: Mutex<()>,
}

impl PolicyEngine {
    /// Starts building an engine for `agent` backed by `store`.
    #[must_use]
    pub fn builder(agent: AgentId, store: Arc<dyn PolicyStore>) -> EngineBuilder {
        EngineBuilder {
            agent,
            store,
            normalizer: PathNormalizer::default(),
            unknown_operation: UnknownOperationPolicy::default(),
            root_default: PermissionSet::console_default(),
            sync_timeout: crate::sync::DEFAULT_SYNC_TIMEOUT,
            audit: None,
            cache: None,
        }
    }

    #[must_use]
    pub fn agent(&self) -> &AgentId {
        &self.agent
    }

    #[must_use]
    pub fn normalizer(&self) -> PathNormalizer {
        self.normalizer
    }

    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    #[must_use]
    pub fn sync_status(&self) -> SyncStatus {
        self.sync.status()
    }

    /// Current immutable policy snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<PolicyTree> {
        self.tree.load()
    }

    /// Effective permissions for `raw_path`.
    #[must_use]
    pub fn effective(&self, raw_path: &str) -> PermissionSet {
        let path = self.normalizer.normalize(raw_path);
        self.tree.load().resolve(&path)
    }

    /// Effective permissions plus the rule they came from.
    #[must_use]
    pub fn explain(&self, raw_path: &str) -> Resolution {
        let path = self.normalizer.normalize(raw_path);
        let tree = self.tree.load();
        let (source, permissions) = tree.resolve_with_source(&path);
        Resolution {
            source: source.clone(),
            path,
            permissions,
        }
    }

    /// Explicit rules that are not browsable (`read` and `download` not both
    /// granted), in path order.
    #[must_use]
    pub fn restricted(&self) -> Vec<(CanonicalPath, PermissionSet)> {
        self.tree
            .load()
            .list_restricted(PermissionSet::is_browsable)
            .map(|(path, perms)| (path.clone(), perms))
            .collect()
    }

    /// Decides whether `operation` is allowed on `raw_path`.
    ///
    /// Never fails and never waits on a pending mutation. Every decision is
    /// recorded in the audit log.
    pub fn check(&self, raw_path: &str, operation: &OperationKind) -> Decision {
        let path = self.normalizer.normalize(raw_path);
        let tree = self.tree.load();
        let (source, perms) = tree.resolve_with_source(&path);

        let Some(flag) = operation.access() else {
            let decision = self.unknown_operation.decision();
            self.audit.append(
                path,
                format!(
                    "unknown operation '{operation}' {} by default",
                    if decision.is_allowed() { "allowed" } else { "denied" }
                ),
                Severity::Warning,
            );
            return decision;
        };

        let decision = Decision::from_bool(perms.allows(flag));
        debug!(agent = %self.agent, %path, %operation, %decision, rule = %source, "Checked");
        let (message, severity) = match decision {
            Decision::Allow => (format!("{operation} allowed"), Severity::Info),
            Decision::Deny => (
                format!("{operation} denied by rule at {source}"),
                Severity::Warning,
            ),
        };
        self.audit.append(path, message, severity);
        decision
    }

    /// Sets the rule at `raw_path` locally and remotely.
    ///
    /// Returns the change id used in the log and audit trail.
    ///
    /// # Errors
    ///
    /// - [`GuardError::InvalidPath`] before any state changes
    /// - [`GuardError::PersistenceFailed`] after the local change was rolled back
    pub async fn apply_rule(
        &self,
        raw_path: &str,
        perms: PermissionSet,
    ) -> Result<ChangeId, GuardError> {
        let summary = format!("rule set to {perms}");
        let path = self.validated(raw_path, &summary)?;
        let _gate = self.gate.lock().await;
        let change = ChangeId::new();
        debug!(%change, state = %ChangeState::Pending, %path, %perms, "Applying rule");

        let mut staged = (*self.tree.load()).clone();
        staged.set_rule(path.clone(), perms);
        debug!(%change, state = %ChangeState::LocalApplied, "Rule staged");

        let pushed = self.sync.push(&path, perms).await;
        self.settle(change, path, Some(staged), pushed, summary).await
    }

    /// Removes the rule at `raw_path` locally and remotely; the path falls
    /// back to inheritance.
    ///
    /// # Errors
    ///
    /// - [`GuardError::InvalidPath`] / [`GuardError::InvalidOperation`] (for
    ///   `/`) before any state changes
    /// - [`GuardError::PersistenceFailed`] after the local change was rolled back
    pub async fn reset_rule(&self, raw_path: &str) -> Result<ChangeId, GuardError> {
        let summary = "rule reset to inherited".to_string();
        let path = self.validated(raw_path, &summary)?;
        let _gate = self.gate.lock().await;
        let change = ChangeId::new();
        debug!(%change, state = %ChangeState::Pending, %path, "Resetting rule");

        let mut staged = (*self.tree.load()).clone();
        let removed = match staged.clear_rule(&path) {
            Ok(removed) => removed,
            Err(e) => {
                warn!(%change, agent = %self.agent, %path, error = %e, "Rule reset refused");
                self.audit.append(
                    path,
                    format!("{summary} refused: {e}"),
                    Severity::Security,
                );
                return Err(e.into());
            }
        };
        debug!(%change, state = %ChangeState::LocalApplied, "Rule removal staged");

        let retracted = self.sync.retract(&path).await;
        let staged = removed.map(|_| staged);
        self.settle(change, path, staged, retracted, summary).await
    }

    /// Pulls the remote rule set.
    ///
    /// Returns [`SyncMode::Degraded`] when the store is unreachable; checks
    /// keep using the previous snapshot.
    ///
    /// # Errors
    ///
    /// [`GuardError::SyncRejected`] when the store refuses the pull.
    pub async fn refresh(&self) -> Result<SyncMode, GuardError> {
        let _gate = self.gate.lock().await;
        match self.sync.pull().await {
            Ok(SyncMode::Degraded) => {
                self.audit.append(
                    CanonicalPath::root(),
                    "policy store unreachable, using last known policy",
                    Severity::Warning,
                );
                Ok(SyncMode::Degraded)
            }
            Ok(mode) => {
                info!(agent = %self.agent, rules = self.tree.load().rule_count(), "Policy refreshed");
                self.persist().await;
                Ok(mode)
            }
            Err(e) => {
                error!(agent = %self.agent, error = %e, "Policy refresh rejected");
                self.audit.append(
                    CanonicalPath::root(),
                    format!("policy refresh rejected: {e}"),
                    Severity::Error,
                );
                Err(GuardError::SyncRejected(e))
            }
        }
    }

    /// Loads the on-disk snapshot, if a cache is configured and one exists.
    ///
    /// Returns `true` if a snapshot was published. Cache failures are logged
    /// and reported as `false`.
    pub async fn restore_cached(&self) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };
        let _gate = self.gate.lock().await;
        match cache.load(&self.agent).await {
            Ok(Some(snapshot)) => {
                let tree = snapshot.into_tree(self.root_default);
                debug!(agent = %self.agent, rules = tree.rule_count(), "Restored cached policy");
                self.tree.replace(Arc::new(tree));
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(agent = %self.agent, error = %e, "Ignoring unreadable policy cache");
                false
            }
        }
    }

    /// Validates `raw_path` for a rule change, auditing a rejection.
    fn validated(&self, raw_path: &str, summary: &str) -> Result<CanonicalPath, GuardError> {
        self.normalizer.validate(raw_path).map_err(|e| {
            warn!(agent = %self.agent, error = %e, "Rule change refused");
            self.audit.append(
                self.normalizer.normalize(raw_path),
                format!("{summary} refused: {e}"),
                Severity::Error,
            );
            GuardError::from(e)
        })
    }

    /// Publishes `staged` once the store confirmed the change.
    ///
    /// `staged` is `None` when the change leaves the local tree as it is.
    async fn settle(
        &self,
        change: ChangeId,
        path: CanonicalPath,
        staged: Option<PolicyTree>,
        remote: Result<(), crate::StoreError>,
        summary: String,
    ) -> Result<ChangeId, GuardError> {
        match remote {
            Ok(()) => {
                if let Some(staged) = staged {
                    self.tree.replace(Arc::new(staged));
                }
                info!(%change, state = %ChangeState::RemoteConfirmed, agent = %self.agent, %path, "{summary}");
                self.audit.append(path, summary, Severity::Security);
                self.persist().await;
                Ok(change)
            }
            Err(source) => {
                error!(%change, state = %ChangeState::RemoteFailed, agent = %self.agent, %path, error = %source, "Rule change rolled back");
                self.audit.append(
                    path.clone(),
                    format!("{summary} failed and was rolled back: {source}"),
                    Severity::Error,
                );
                Err(GuardError::PersistenceFailed { path, source })
            }
        }
    }

    async fn persist(&self) {
        let Some(cache) = &self.cache else {
            return;
        };
        let snapshot = PolicySnapshot::capture(&self.agent, &self.tree.load());
        if let Err(e) = cache.save(&snapshot).await {
            warn!(agent = %self.agent, error = %e, "Failed to write policy cache");
        }
    }
}
