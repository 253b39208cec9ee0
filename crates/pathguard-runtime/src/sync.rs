//! Reconciliation between the local policy tree and the remote store.
//!
//! # Modes
//!
//! ```text
//!             pull ok                 pull: unreachable / timeout
//! Unsynced ─────────► Online ◄──────────────────────────► Degraded
//!     │                 ▲            pull ok                  ▲
//!     └─────────────────┼─────────────────────────────────────┘
//!                       push / retract ok
//! ```
//!
//! A degraded pull keeps serving the previous snapshot. A rejected pull
//! (the store answered and refused) is a hard error and changes nothing.
//!
//! Every remote call is bounded by the configured timeout; the store
//! future is dropped when it expires.

use crate::StoreError;
use crate::{PolicyStore, RuleRecord};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use pathguard_policy::{CanonicalPath, PathNormalizer, PermissionSet, PolicyTree};
use pathguard_types::AgentId;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default bound on a single remote call.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(10);

/// Atomically swappable handle to the current policy tree.
///
/// Readers take an `Arc` snapshot and never observe a partially applied
/// change. Writers replace the whole tree.
#[derive(Debug, Clone, Default)]
pub struct SharedTree {
    inner: Arc<RwLock<Arc<PolicyTree>>>,
}

impl SharedTree {
    #[must_use]
    pub fn new(tree: PolicyTree) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(tree))),
        }
    }

    /// Current snapshot.
    #[must_use]
    pub fn load(&self) -> Arc<PolicyTree> {
        Arc::clone(&self.inner.read())
    }

    /// Publishes `tree`, returning the snapshot it replaced.
    pub fn replace(&self, tree: Arc<PolicyTree>) -> Arc<PolicyTree> {
        std::mem::replace(&mut *self.inner.write(), tree)
    }
}

/// Connectivity state of a [`PolicySync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// No remote call has completed yet.
    #[default]
    Unsynced,
    /// The last remote call succeeded.
    Online,
    /// The remote could not be reached; local snapshot in use.
    Degraded,
}

impl SyncMode {
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unsynced => "unsynced",
            Self::Online => "online",
            Self::Degraded => "degraded",
        }
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of sync health.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub mode: SyncMode,
    /// Time of the last successful remote call.
    pub last_sync: Option<DateTime<Utc>>,
    /// Message of the last failed remote call, cleared on success.
    pub last_error: Option<String>,
}

/// Pushes rule changes to, and pulls rule sets from, a [`PolicyStore`].
///
/// Shares the engine's [`SharedTree`]: `pull` publishes into it, `push`
/// and `retract` only talk to the store.
#[derive(Debug)]
pub struct PolicySync {
    agent: AgentId,
    store: Arc<dyn PolicyStore>,
    tree: SharedTree,
    normalizer: PathNormalizer,
    root_default: PermissionSet,
    timeout: Duration,
    status: Mutex<SyncStatus>,
}

impl PolicySync {
    #[must_use]
    pub fn new(
        agent: AgentId,
        store: Arc<dyn PolicyStore>,
        tree: SharedTree,
        normalizer: PathNormalizer,
        root_default: PermissionSet,
    ) -> Self {
        Self {
            agent,
            store,
            tree,
            normalizer,
            root_default,
            timeout: DEFAULT_SYNC_TIMEOUT,
            status: Mutex::new(SyncStatus::default()),
        }
    }

    /// Overrides the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.status.lock().clone()
    }

    /// Sends one rule to the store. No retry.
    ///
    /// # Errors
    ///
    /// Any [`StoreError`]; expiry of the timeout is [`StoreError::Timeout`].
    pub async fn push(&self, path: &CanonicalPath, perms: PermissionSet) -> Result<(), StoreError> {
        debug!(agent = %self.agent, %path, %perms, "Pushing rule");
        let result = self
            .bounded(self.store.set_rule(&self.agent, path, perms))
            .await;
        self.record(&result);
        result
    }

    /// Removes one rule from the store. No retry.
    ///
    /// # Errors
    ///
    /// Same as [`push`](Self::push).
    pub async fn retract(&self, path: &CanonicalPath) -> Result<(), StoreError> {
        debug!(agent = %self.agent, %path, "Retracting rule");
        let result = self.bounded(self.store.clear_rule(&self.agent, path)).await;
        self.record(&result);
        result
    }

    /// Fetches the remote rule set and publishes it as the new tree.
    ///
    /// Returns [`SyncMode::Online`] after publishing, or
    /// [`SyncMode::Degraded`] when the store could not be reached (the
    /// local tree is left as is).
    ///
    /// # Errors
    ///
    /// Non-connectivity failures ([`StoreError::Rejected`],
    /// [`StoreError::Codec`]); the local tree is left as is.
    pub async fn pull(&self) -> Result<SyncMode, StoreError> {
        let result = self.bounded(self.store.get_all_rules(&self.agent)).await;
        self.record(&result);
        match result {
            Ok(records) => {
                let tree = self.build_tree(records);
                debug!(agent = %self.agent, rules = tree.rule_count(), "Pulled rule set");
                self.tree.replace(Arc::new(tree));
                Ok(SyncMode::Online)
            }
            Err(e) if e.is_connectivity() => {
                warn!(agent = %self.agent, error = %e, "Policy store unreachable, keeping local snapshot");
                Ok(SyncMode::Degraded)
            }
            Err(e) => Err(e),
        }
    }

    fn build_tree(&self, records: Vec<RuleRecord>) -> PolicyTree {
        let rules = records
            .into_iter()
            .map(|r| (self.normalizer.normalize(&r.path), r.permissions()));
        PolicyTree::from_rules(self.root_default, rules)
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }

    fn record<T>(&self, result: &Result<T, StoreError>) {
        let mut status = self.status.lock();
        match result {
            Ok(_) => {
                status.mode = SyncMode::Online;
                status.last_sync = Some(Utc::now());
                status.last_error = None;
            }
            Err(e) => {
                if e.is_connectivity() {
                    status.mode = SyncMode::Degraded;
                }
                status.last_error = Some(e.to_string());
            }
        }
    }
}
