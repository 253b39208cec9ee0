//! Directory listings gated by policy.
//!
//! A [`DirectoryProvider`] fetches listings from an agent; it knows nothing
//! about rules. [`GuardedDirectory`] puts a [`PolicyEngine`] in front of it:
//! the check runs first and a denied call never reaches the agent.
//!
//! | Call | Required capability |
//! |------|---------------------|
//! | `list` | `read` |
//! | `info` | `read` |
//! | `search` | `search` |
//! | `download` | `download` |
//! | `delete` | `delete` |

mod http;

pub use http::HttpDirectoryProvider;

use crate::{DirectoryError, PolicyEngine};
use async_trait::async_trait;
use pathguard_policy::{CanonicalPath, OperationKind, PermissionSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// One file or folder as reported by an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    pub is_directory: bool,
    #[serde(default)]
    pub size: u64,
    /// Modification time as reported by the agent (free-form).
    #[serde(default)]
    pub modified: Option<String>,
    /// The agent process can read the entry at OS level.
    #[serde(default)]
    pub os_readable: bool,
    /// The agent process can write the entry at OS level.
    #[serde(default)]
    pub os_writable: bool,
}

/// A [`DirEntry`] with the policy that applies to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardedEntry {
    #[serde(flatten)]
    pub entry: DirEntry,
    pub permissions: PermissionSet,
}

impl GuardedEntry {
    /// Folder the console would flag as restricted.
    #[must_use]
    pub fn is_restricted(&self) -> bool {
        self.entry.is_directory && !self.permissions.is_browsable()
    }
}

/// Source of directory listings for one agent.
#[async_trait]
pub trait DirectoryProvider: Send + Sync {
    /// Lists the immediate children of `path`.
    async fn list(&self, path: &CanonicalPath) -> Result<Vec<DirEntry>, DirectoryError>;

    /// Recursively searches beneath `path` for names matching `query`.
    async fn search(
        &self,
        path: &CanonicalPath,
        query: &str,
    ) -> Result<Vec<DirEntry>, DirectoryError>;

    /// Metadata for the single entry at `path`.
    async fn info(&self, path: &CanonicalPath) -> Result<DirEntry, DirectoryError>;

    /// File contents, or a zip archive of a folder when `compress` is set.
    async fn download(
        &self,
        path: &CanonicalPath,
        compress: bool,
    ) -> Result<Vec<u8>, DirectoryError>;

    /// Deletes the file or folder at `path`.
    async fn delete(&self, path: &CanonicalPath) -> Result<(), DirectoryError>;
}

/// Provider wrapper that enforces the engine's decisions.
///
/// # Example
///
/// ```no_run
/// use pathguard_runtime::{GuardedDirectory, HttpDirectoryProvider, MemoryPolicyStore, PolicyEngine};
/// use pathguard_types::AgentId;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), pathguard_runtime::DirectoryError> {
/// let engine = Arc::new(
///     PolicyEngine::builder(AgentId::new("host-01"), Arc::new(MemoryPolicyStore::new())).build(),
/// );
/// let dir = GuardedDirectory::new(engine, HttpDirectoryProvider::new("http://agent:9000"));
///
/// for item in dir.list("C:/Users").await? {
///     println!("{} {}", item.permissions, item.entry.name);
/// }
/// # Ok(())
/// # }
/// ```
pub struct GuardedDirectory<P> {
    engine: Arc<PolicyEngine>,
    provider: P,
}

impl<P: DirectoryProvider> GuardedDirectory<P> {
    #[must_use]
    pub fn new(engine: Arc<PolicyEngine>, provider: P) -> Self {
        Self { engine, provider }
    }

    #[must_use]
    pub fn engine(&self) -> &PolicyEngine {
        &self.engine
    }

    /// Lists `raw_path` if `read` is allowed there.
    ///
    /// # Errors
    ///
    /// [`DirectoryError::Denied`] without contacting the agent, or the
    /// provider's error.
    pub async fn list(&self, raw_path: &str) -> Result<Vec<GuardedEntry>, DirectoryError> {
        let path = self.authorize(raw_path, OperationKind::Read)?;
        let entries = self.provider.list(&path).await?;
        Ok(self.annotate(entries))
    }

    /// Searches beneath `raw_path` if `search` is allowed there.
    ///
    /// # Errors
    ///
    /// Same as [`list`](Self::list).
    pub async fn search(
        &self,
        raw_path: &str,
        query: &str,
    ) -> Result<Vec<GuardedEntry>, DirectoryError> {
        let path = self.authorize(raw_path, OperationKind::Search)?;
        let entries = self.provider.search(&path, query).await?;
        Ok(self.annotate(entries))
    }

    /// Fetches metadata for `raw_path` if `read` is allowed there.
    ///
    /// # Errors
    ///
    /// Same as [`list`](Self::list).
    pub async fn info(&self, raw_path: &str) -> Result<GuardedEntry, DirectoryError> {
        let path = self.authorize(raw_path, OperationKind::Read)?;
        let entry = self.provider.info(&path).await?;
        let permissions = self.engine.snapshot().resolve(&path);
        Ok(GuardedEntry { entry, permissions })
    }

    /// Downloads `raw_path` if `download` is allowed there.
    ///
    /// # Errors
    ///
    /// Same as [`list`](Self::list).
    pub async fn download(
        &self,
        raw_path: &str,
        compress: bool,
    ) -> Result<Vec<u8>, DirectoryError> {
        let path = self.authorize(raw_path, OperationKind::Download)?;
        let bytes = self.provider.download(&path, compress).await?;
        debug!(%path, compress, bytes = bytes.len(), "Downloaded");
        Ok(bytes)
    }

    /// Deletes `raw_path` on the agent if `delete` is allowed there.
    ///
    /// # Errors
    ///
    /// Same as [`list`](Self::list).
    pub async fn delete(&self, raw_path: &str) -> Result<(), DirectoryError> {
        let path = self.authorize(raw_path, OperationKind::Delete)?;
        self.provider.delete(&path).await?;
        info!(agent = %self.engine.agent(), %path, "Deleted on agent");
        Ok(())
    }

    fn authorize(
        &self,
        raw_path: &str,
        operation: OperationKind,
    ) -> Result<CanonicalPath, DirectoryError> {
        let path = self.engine.normalizer().normalize(raw_path);
        if self.engine.check(path.as_str(), &operation).is_denied() {
            return Err(DirectoryError::Denied { path, operation });
        }
        Ok(path)
    }

    fn annotate(&self, entries: Vec<DirEntry>) -> Vec<GuardedEntry> {
        let tree = self.engine.snapshot();
        let normalizer = self.engine.normalizer();
        entries
            .into_iter()
            .map(|entry| {
                let permissions = tree.resolve(&normalizer.normalize(&entry.path));
                GuardedEntry { entry, permissions }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryPolicyStore;
    use pathguard_types::AgentId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeProvider {
        calls: AtomicUsize,
    }

    fn entry(path: &str, is_directory: bool) -> DirEntry {
        DirEntry {
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            path: path.to_string(),
            is_directory,
            size: 0,
            modified: None,
            os_readable: true,
            os_writable: false,
        }
    }

    #[async_trait]
    impl DirectoryProvider for FakeProvider {
        async fn list(&self, _path: &CanonicalPath) -> Result<Vec<DirEntry>, DirectoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![entry("/data/secure", true), entry("/data/open.txt", false)])
        }

        async fn search(
            &self,
            _path: &CanonicalPath,
            _query: &str,
        ) -> Result<Vec<DirEntry>, DirectoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![entry("/data/open.txt", false)])
        }

        async fn info(&self, path: &CanonicalPath) -> Result<DirEntry, DirectoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(entry(path.as_str(), true))
        }

        async fn download(
            &self,
            _path: &CanonicalPath,
            compress: bool,
        ) -> Result<Vec<u8>, DirectoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(if compress { b"PK".to_vec() } else { b"data".to_vec() })
        }

        async fn delete(&self, _path: &CanonicalPath) -> Result<(), DirectoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn guarded() -> GuardedDirectory<FakeProvider> {
        let engine = PolicyEngine::builder(AgentId::new("a"), Arc::new(MemoryPolicyStore::new()))
            .build();
        engine
            .apply_rule("/data/secure", PermissionSet::blocked())
            .await
            .expect("apply");
        GuardedDirectory::new(Arc::new(engine), FakeProvider::default())
    }

    #[tokio::test]
    async fn list_annotates_entries() {
        let dir = guarded().await;
        let items = dir.list("/data").await.expect("list");
        assert_eq!(items.len(), 2);
        assert!(items[0].is_restricted());
        assert_eq!(items[1].permissions, PermissionSet::console_default());
    }

    #[tokio::test]
    async fn denied_list_never_reaches_provider() {
        let dir = guarded().await;
        let err = dir.list("/data/secure/inner").await.expect_err("denied");
        assert!(matches!(err, DirectoryError::Denied { operation: OperationKind::Read, .. }));
        assert_eq!(dir.provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn search_requires_search_flag() {
        let dir = guarded().await;
        assert!(dir.search("/data", "open").await.is_ok());
        let err = dir.search("/data/secure", "x").await.expect_err("denied");
        assert!(matches!(err, DirectoryError::Denied { operation: OperationKind::Search, .. }));
        assert_eq!(dir.provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn info_carries_the_applying_rule() {
        let dir = guarded().await;
        let err = dir.info("/data/secure").await.expect_err("read denied");
        assert!(matches!(err, DirectoryError::Denied { operation: OperationKind::Read, .. }));

        let item = dir.info("/data").await.expect("info");
        assert_eq!(item.entry.path, "/data");
        assert_eq!(item.permissions, PermissionSet::console_default());
    }

    #[tokio::test]
    async fn download_needs_download_flag() {
        let dir = guarded().await;
        assert_eq!(dir.download("/data/open.txt", false).await.expect("file"), b"data");
        assert_eq!(dir.download("/data", true).await.expect("archive"), b"PK");

        let err = dir.download("/data/secure/key", false).await.expect_err("denied");
        assert!(matches!(err, DirectoryError::Denied { operation: OperationKind::Download, .. }));
        assert_eq!(dir.provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn delete_is_denied_by_default() {
        let dir = guarded().await;
        let err = dir.delete("/data/open.txt").await.expect_err("default denies delete");
        assert!(matches!(err, DirectoryError::Denied { operation: OperationKind::Delete, .. }));

        dir.engine()
            .apply_rule("/data/tmp", PermissionSet::full_access())
            .await
            .expect("apply");
        dir.delete("/data/tmp/old.log").await.expect("allowed");
        assert_eq!(dir.provider.calls.load(Ordering::SeqCst), 1);
    }
}
