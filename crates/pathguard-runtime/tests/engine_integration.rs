//! Integration tests for the policy engine.
//!
//! Exercises the full flow: engine → sync → store, plus cache restart,
//! guarded listings and per-agent isolation.

use async_trait::async_trait;
use pathguard_policy::{normalize, CanonicalPath, Decision, OperationKind, PermissionSet};
use pathguard_runtime::{
    AuditFilter, DirEntry, DirectoryError, DirectoryProvider, GuardError, GuardedDirectory,
    MemoryPolicyStore, PolicyEngine, PolicyRegistry, PolicyStore, Severity, SnapshotCache,
    StoreError, StoreFault, SyncMode,
};
use pathguard_types::AgentId;
use std::sync::Arc;
use std::time::Duration;

fn agent() -> AgentId {
    AgentId::new("host-01")
}

fn engine(store: &Arc<MemoryPolicyStore>) -> PolicyEngine {
    PolicyEngine::builder(agent(), store.clone())
        .sync_timeout(Duration::from_millis(100))
        .build()
}

// ─── Inheritance ───────────────────────────────────────────────────

#[tokio::test]
async fn blocked_folder_covers_descendants_only() {
    let store = Arc::new(MemoryPolicyStore::new());
    let engine = engine(&store);

    engine
        .apply_rule("/secure", PermissionSet::blocked())
        .await
        .expect("apply /secure");

    for op in [OperationKind::Read, OperationKind::Download, OperationKind::Search] {
        assert_eq!(engine.check("/secure/deep/file.txt", &op), Decision::Deny);
    }
    assert_eq!(engine.check("/secured", &OperationKind::Read), Decision::Allow);
    assert_eq!(engine.check("/public/file.txt", &OperationKind::Read), Decision::Allow);
    assert_eq!(engine.check("/public/file.txt", &OperationKind::Write), Decision::Deny);

    assert_eq!(
        store.stored(&agent(), "/secure"),
        Some(PermissionSet::blocked())
    );
}

#[tokio::test]
async fn nearer_rule_overrides_ancestor() {
    let store = Arc::new(MemoryPolicyStore::new());
    let engine = engine(&store);

    engine
        .apply_rule("/secure", PermissionSet::blocked())
        .await
        .expect("apply parent");
    engine
        .apply_rule("/secure/shared", PermissionSet::console_default())
        .await
        .expect("apply child");

    let explained = engine.explain("/secure/shared/a.txt");
    assert_eq!(explained.source, normalize("/secure/shared"));
    assert!(explained.is_inherited());
    assert_eq!(engine.check("/secure/shared/a.txt", &OperationKind::Read), Decision::Allow);
    assert_eq!(engine.check("/secure/other", &OperationKind::Read), Decision::Deny);

    engine.reset_rule("/secure/shared").await.expect("reset child");
    assert_eq!(engine.check("/secure/shared/a.txt", &OperationKind::Read), Decision::Deny);
    assert!(store.stored(&agent(), "/secure/shared").is_none());
}

#[tokio::test]
async fn equivalent_spellings_share_one_rule() {
    let store = Arc::new(MemoryPolicyStore::new());
    let engine = engine(&store);

    engine
        .apply_rule("C:\\Users\\Admin", PermissionSet::blocked())
        .await
        .expect("apply");

    assert_eq!(engine.check("C:/Users/Admin/Desktop", &OperationKind::Read), Decision::Deny);
    assert_eq!(engine.check("C:/Users//Admin/", &OperationKind::Read), Decision::Deny);
    assert_eq!(engine.check("C:/Users/Guest", &OperationKind::Read), Decision::Allow);
    assert_eq!(engine.snapshot().rule_count(), 2);
}

// ─── Failure handling ──────────────────────────────────────────────

#[tokio::test]
async fn unreachable_store_rolls_back_and_audits() {
    let store = Arc::new(MemoryPolicyStore::new());
    let engine = engine(&store);
    store.inject(Some(StoreFault::Unreachable));

    let err = engine
        .apply_rule("/secure", PermissionSet::blocked())
        .await
        .expect_err("store down");

    assert!(matches!(
        err,
        GuardError::PersistenceFailed {
            source: StoreError::Unreachable { .. },
            ..
        }
    ));
    assert_eq!(engine.check("/secure", &OperationKind::Read), Decision::Allow);
    assert_eq!(store.rule_count(&agent()), 0);

    let errors: Vec<_> = engine
        .audit()
        .query(AuditFilter::new().severity(Severity::Error))
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("rolled back"));
}

#[tokio::test]
async fn hanging_store_times_out() {
    let store = Arc::new(MemoryPolicyStore::new());
    let engine = PolicyEngine::builder(agent(), store.clone())
        .sync_timeout(Duration::from_millis(20))
        .build();
    store.inject(Some(StoreFault::Hang));

    let err = engine
        .apply_rule("/slow", PermissionSet::blocked())
        .await
        .expect_err("timeout");
    assert!(matches!(
        err,
        GuardError::PersistenceFailed {
            source: StoreError::Timeout(_),
            ..
        }
    ));
    assert!(engine.snapshot().explicit(&normalize("/slow")).is_none());
}

#[tokio::test]
async fn invalid_path_changes_nothing() {
    let store = Arc::new(MemoryPolicyStore::new());
    let engine = engine(&store);

    let err = engine
        .apply_rule("/bad\u{0}name", PermissionSet::blocked())
        .await
        .expect_err("control character");
    assert!(matches!(err, GuardError::InvalidPath { .. }));

    let err = engine.reset_rule("/").await.expect_err("root reset");
    assert!(matches!(err, GuardError::InvalidOperation(_)));

    assert_eq!(store.rule_count(&agent()), 0);
    assert_eq!(engine.snapshot().rule_count(), 1);

    let refused: Vec<_> = engine
        .audit()
        .query(AuditFilter::new().min_severity(Severity::Error))
        .collect();
    assert_eq!(refused.len(), 2);
    assert_eq!(refused[0].severity, Severity::Error);
    assert_eq!(refused[1].severity, Severity::Security);
    assert!(refused[1].path.is_root());
}

#[tokio::test]
async fn cancelled_apply_never_exposes_the_rule() {
    let store = Arc::new(MemoryPolicyStore::new());
    let engine = engine(&store);
    store.inject(Some(StoreFault::Hang));

    let cancelled = tokio::time::timeout(
        Duration::from_millis(20),
        engine.apply_rule("/secure", PermissionSet::full_access()),
    )
    .await;
    assert!(cancelled.is_err());

    assert_eq!(engine.effective("/secure"), PermissionSet::console_default());
    assert_eq!(engine.check("/secure/a", &OperationKind::Write), Decision::Deny);
    assert_eq!(store.stored(&agent(), "/secure"), None);
}

#[tokio::test]
async fn refresh_degrades_then_recovers() {
    let store = Arc::new(MemoryPolicyStore::new());
    let engine = engine(&store);
    engine
        .apply_rule("/secure", PermissionSet::blocked())
        .await
        .expect("apply");

    store.inject(Some(StoreFault::Unreachable));
    assert_eq!(engine.refresh().await.expect("degraded"), SyncMode::Degraded);
    assert!(engine.sync_status().mode.is_degraded());
    assert_eq!(engine.check("/secure", &OperationKind::Read), Decision::Deny);

    store.inject(None);
    store
        .set_rule(&agent(), &normalize("/other"), PermissionSet::blocked())
        .await
        .expect("direct write");
    assert_eq!(engine.refresh().await.expect("online"), SyncMode::Online);
    assert_eq!(engine.check("/other/x", &OperationKind::Read), Decision::Deny);
    assert!(engine.sync_status().last_error.is_none());
}

#[tokio::test]
async fn rejected_refresh_is_an_error() {
    let store = Arc::new(MemoryPolicyStore::new());
    let engine = engine(&store);
    store.inject(Some(StoreFault::Reject));

    let err = engine.refresh().await.expect_err("rejected");
    assert!(matches!(err, GuardError::SyncRejected(StoreError::Rejected { status: 403, .. })));
}

// ─── Cache ─────────────────────────────────────────────────────────

#[tokio::test]
async fn restart_restores_cached_policy() {
    let tmp = tempfile::tempdir().expect("create cache dir");
    let store = Arc::new(MemoryPolicyStore::new());

    let first = PolicyEngine::builder(agent(), store.clone())
        .cache(SnapshotCache::new(tmp.path()))
        .build();
    first
        .apply_rule("/secure", PermissionSet::blocked())
        .await
        .expect("apply");
    drop(first);

    let offline = Arc::new(MemoryPolicyStore::new());
    offline.inject(Some(StoreFault::Unreachable));
    let second = PolicyEngine::builder(agent(), offline)
        .cache(SnapshotCache::new(tmp.path()))
        .build();

    assert!(second.restore_cached().await);
    assert_eq!(second.refresh().await.expect("degraded"), SyncMode::Degraded);
    assert_eq!(second.check("/secure/a", &OperationKind::Read), Decision::Deny);
}

// ─── Restricted listing and guarded directories ────────────────────

#[tokio::test]
async fn restricted_lists_only_non_browsable_rules() {
    let store = Arc::new(MemoryPolicyStore::new());
    let engine = engine(&store);

    engine
        .apply_rule("/b", PermissionSet::blocked())
        .await
        .expect("apply /b");
    engine
        .apply_rule("/a", PermissionSet::full_access())
        .await
        .expect("apply /a");
    engine
        .apply_rule("/c", PermissionSet::new(true, true, false, false, true, true))
        .await
        .expect("apply /c");

    let restricted: Vec<CanonicalPath> = engine.restricted().into_iter().map(|(p, _)| p).collect();
    assert_eq!(restricted, vec![normalize("/b"), normalize("/c")]);
}

struct StaticProvider;

#[async_trait]
impl DirectoryProvider for StaticProvider {
    async fn list(&self, path: &CanonicalPath) -> Result<Vec<DirEntry>, DirectoryError> {
        Ok(["docs", "secure"]
            .into_iter()
            .map(|name| DirEntry {
                name: name.to_string(),
                path: format!("{}/{name}", path.as_str().trim_end_matches('/')),
                is_directory: true,
                size: 0,
                modified: None,
                os_readable: true,
                os_writable: true,
            })
            .collect())
    }

    async fn search(
        &self,
        _path: &CanonicalPath,
        _query: &str,
    ) -> Result<Vec<DirEntry>, DirectoryError> {
        Err(DirectoryError::Agent("search not supported".into()))
    }

    async fn info(&self, _path: &CanonicalPath) -> Result<DirEntry, DirectoryError> {
        Err(DirectoryError::Agent("info not supported".into()))
    }

    async fn download(
        &self,
        _path: &CanonicalPath,
        _compress: bool,
    ) -> Result<Vec<u8>, DirectoryError> {
        Err(DirectoryError::Agent("download not supported".into()))
    }

    async fn delete(&self, _path: &CanonicalPath) -> Result<(), DirectoryError> {
        Err(DirectoryError::Agent("delete not supported".into()))
    }
}

#[tokio::test]
async fn guarded_listing_flags_restricted_children() {
    let store = Arc::new(MemoryPolicyStore::new());
    let engine = Arc::new(engine(&store));
    engine
        .apply_rule("/home/secure", PermissionSet::blocked())
        .await
        .expect("apply");

    let dir = GuardedDirectory::new(Arc::clone(&engine), StaticProvider);
    let items = dir.list("/home").await.expect("list");
    let flagged: Vec<&str> = items
        .iter()
        .filter(|i| i.is_restricted())
        .map(|i| i.entry.name.as_str())
        .collect();
    assert_eq!(flagged, vec!["secure"]);

    let err = dir.list("/home/secure").await.expect_err("denied");
    assert!(matches!(err, DirectoryError::Denied { .. }));

    let err = dir.search("/home", "x").await.expect_err("provider error");
    assert!(matches!(err, DirectoryError::Agent(_)));
}

// ─── Registry ──────────────────────────────────────────────────────

#[tokio::test]
async fn registry_isolates_agents_sharing_a_store() {
    let store = Arc::new(MemoryPolicyStore::new());
    let factory_store = store.clone();
    let registry = PolicyRegistry::new(move |agent| {
        PolicyEngine::builder(agent.clone(), factory_store.clone()).build()
    });

    let a = registry.engine(&AgentId::new("a"));
    let b = registry.engine(&AgentId::new("b"));
    a.apply_rule("/x", PermissionSet::blocked()).await.expect("apply a");

    b.refresh().await.expect("refresh b");
    assert_eq!(a.check("/x", &OperationKind::Read), Decision::Deny);
    assert_eq!(b.check("/x", &OperationKind::Read), Decision::Allow);
    assert_eq!(store.rule_count(&AgentId::new("a")), 1);
    assert_eq!(store.rule_count(&AgentId::new("b")), 0);
}

#[tokio::test]
async fn concurrent_applies_are_serialized() {
    let store = Arc::new(MemoryPolicyStore::new());
    let engine = Arc::new(engine(&store));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .apply_rule(&format!("/dir{i}"), PermissionSet::blocked())
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.expect("join").expect("apply");
    }

    assert_eq!(engine.snapshot().rule_count(), 9);
    assert_eq!(store.rule_count(&agent()), 8);
}
