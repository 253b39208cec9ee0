//! Runtime layer for PathGuard.
//!
//! Wraps the pure policy model from `pathguard-policy` with everything that
//! touches the outside world: the remote policy store, snapshot caching,
//! serialized mutations, the audit trail, guarded directory listings and
//! layered configuration.
//!
//! # Overview
//!
//! ```text
//!                  ┌──────────────────────────────┐
//!   check ────────►│         PolicyEngine         │──► AuditLog
//!   apply_rule ───►│  SharedTree ◄── PolicySync ──┼──► PolicyStore (memory / HTTP)
//!   reset_rule ───►│                              │──► SnapshotCache (optional)
//!   refresh ──────►└──────────────────────────────┘
//!                                ▲
//!            GuardedDirectory ───┘ ──► DirectoryProvider (agent file API)
//! ```
//!
//! A [`PolicyRegistry`] holds one engine per agent.
//!
//! # Example
//!
//! ```
//! use pathguard_policy::{Decision, OperationKind, PermissionSet};
//! use pathguard_runtime::{MemoryPolicyStore, PolicyEngine};
//! use pathguard_types::AgentId;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), pathguard_runtime::GuardError> {
//! let engine = PolicyEngine::builder(AgentId::new("host-01"), Arc::new(MemoryPolicyStore::new()))
//!     .build();
//!
//! engine.apply_rule("/secure", PermissionSet::blocked()).await?;
//! assert_eq!(engine.check("/secure/keys", &OperationKind::Read), Decision::Deny);
//! assert_eq!(engine.check("/public", &OperationKind::Read), Decision::Allow);
//! # Ok(())
//! # }
//! ```
//!
//! # Crate Architecture
//!
//! ```text
//! pathguard-types
//!        ↑
//! pathguard-policy
//!        ↑
//! pathguard-runtime   ◄── THIS CRATE
//!        ↑
//! pathguard-cli
//! ```

pub mod audit;
pub mod cache;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod registry;
pub mod store;
pub mod sync;
pub(crate) mod transport;

pub use audit::{AuditEntry, AuditFilter, AuditLog, Severity, DEFAULT_AUDIT_CAPACITY};
pub use cache::{PolicySnapshot, SnapshotCache, SnapshotRule};
pub use directory::{
    DirEntry, DirectoryProvider, GuardedDirectory, GuardedEntry, HttpDirectoryProvider,
};
pub use engine::{ChangeState, EngineBuilder, PolicyEngine, Resolution};
pub use error::{DirectoryError, GuardError, StoreError};
pub use registry::PolicyRegistry;
pub use store::{HttpPolicyStore, MemoryPolicyStore, PolicyStore, RuleRecord, StoreFault};
pub use sync::{PolicySync, SharedTree, SyncMode, SyncStatus, DEFAULT_SYNC_TIMEOUT};

pub use pathguard_types::{AgentId, ChangeId, ErrorCode};
