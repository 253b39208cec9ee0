//! On-disk snapshot of last-known policy, one JSON file per agent.
//!
//! ```text
//! ~/.pathguard/cache/
//! ├── host-01.json
//! └── host%2F02.json     (agent id "host/02")
//! ```
//!
//! Written after every confirmed change and successful pull so that an
//! engine restarted while the remote is unreachable starts from the last
//! policy it saw instead of the bare root default.

use crate::StoreError;
use chrono::{DateTime, Utc};
use pathguard_policy::{CanonicalPath, PermissionSet, PolicyTree};
use pathguard_types::AgentId;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Serialized form of a policy tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub agent_id: AgentId,
    pub saved_at: DateTime<Utc>,
    pub rules: Vec<SnapshotRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRule {
    pub path: CanonicalPath,
    pub permissions: PermissionSet,
}

impl PolicySnapshot {
    /// Captures every explicit rule of `tree`.
    #[must_use]
    pub fn capture(agent: &AgentId, tree: &PolicyTree) -> Self {
        Self {
            agent_id: agent.clone(),
            saved_at: Utc::now(),
            rules: tree
                .iter()
                .map(|(path, permissions)| SnapshotRule {
                    path: path.clone(),
                    permissions,
                })
                .collect(),
        }
    }

    /// Rebuilds a tree; `root_default` applies if the snapshot has no `/` rule.
    #[must_use]
    pub fn into_tree(self, root_default: PermissionSet) -> PolicyTree {
        PolicyTree::from_rules(
            root_default,
            self.rules.into_iter().map(|r| (r.path, r.permissions)),
        )
    }
}

/// Directory of per-agent snapshot files.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    dir: PathBuf,
}

impl SnapshotCache {
    /// Creates a cache rooted at `dir` (`~/` is expanded). The directory is
    /// created lazily on first save.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: expand_tilde(dir.as_ref()),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding `agent`'s snapshot.
    #[must_use]
    pub fn snapshot_path(&self, agent: &AgentId) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(agent)))
    }

    fn temp_path(&self, agent: &AgentId) -> PathBuf {
        self.dir.join(format!(".{}.json.tmp", file_stem(agent)))
    }

    /// Writes `snapshot` atomically (temp file, then rename).
    ///
    /// # Errors
    ///
    /// [`StoreError::Io`] or [`StoreError::Codec`].
    pub async fn save(&self, snapshot: &PolicySnapshot) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| StoreError::Codec(e.to_string()))?;
        let path = self.snapshot_path(&snapshot.agent_id);
        let temp_path = self.temp_path(&snapshot.agent_id);

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, &e))?;
        fs::write(&temp_path, json)
            .await
            .map_err(|e| StoreError::io(&temp_path, &e))?;
        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| StoreError::io(&path, &e))?;
        Ok(())
    }

    /// Reads `agent`'s snapshot. A missing file is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Io`] if the file exists but cannot be read,
    /// [`StoreError::Codec`] if it is not a snapshot.
    pub async fn load(&self, agent: &AgentId) -> Result<Option<PolicySnapshot>, StoreError> {
        let path = self.snapshot_path(agent);
        let json = match fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&path, &e)),
        };
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| StoreError::Codec(format!("{}: {e}", path.display())))
    }
}

/// Agent ids are opaque. Bytes outside `[A-Za-z0-9._-]` become `%XX`, so
/// distinct ids never share a file.
fn file_stem(agent: &AgentId) -> String {
    let mut stem = String::with_capacity(agent.as_str().len());
    for b in agent.as_str().bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.') {
            stem.push(char::from(b));
        } else {
            let _ = write!(stem, "%{b:02X}");
        }
    }
    stem
}

/// Expands `~` to the user's home directory.
pub(crate) fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(rest) = path.to_str().and_then(|s| s.strip_prefix("~/")) {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
